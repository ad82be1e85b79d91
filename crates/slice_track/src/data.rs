//! Columnar, render-ready slice datasets

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::args::{ArgResolver, ArgSet};
use crate::error::Result;
use crate::quantize::MergedRow;
use crate::slice::{IntervalRow, TrackKind};
use crate::window::DataRequest;

/// Extra long column: submission id per entry, GPU queue tracks only
pub const SUBMISSION_IDS: &str = "submissionIds";
/// Extra string column: comma-joined source ids per merged bucket
pub const CONCATED_IDS: &str = "concatedIds";

/// Index-aligned columns for one request. `ids[i] == -1` marks a merged bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceData {
    pub request: DataRequest,
    pub ids: Vec<i64>,
    pub starts: Vec<i64>,
    pub ends: Vec<i64>,
    pub depths: Vec<i32>,
    pub titles: Vec<String>,
    pub categories: Vec<String>,
    pub args: Vec<ArgSet>,
    extra_longs: HashMap<String, Vec<i64>>,
    extra_strings: HashMap<String, Vec<String>>,
}

impl SliceData {
    pub fn empty(request: DataRequest) -> Self {
        Self::with_capacity(request, 0)
    }

    fn with_capacity(request: DataRequest, rows: usize) -> Self {
        Self {
            request,
            ids: Vec::with_capacity(rows),
            starts: Vec::with_capacity(rows),
            ends: Vec::with_capacity(rows),
            depths: Vec::with_capacity(rows),
            titles: Vec::with_capacity(rows),
            categories: Vec::with_capacity(rows),
            args: Vec::with_capacity(rows),
            extra_longs: HashMap::new(),
            extra_strings: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn put_extra_longs(&mut self, name: impl Into<String>, longs: Vec<i64>) {
        self.extra_longs.insert(name.into(), longs);
    }

    /// Missing columns read as empty
    pub fn get_extra_longs(&self, name: &str) -> &[i64] {
        self.extra_longs.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn put_extra_strings(&mut self, name: impl Into<String>, strings: Vec<String>) {
        self.extra_strings.insert(name.into(), strings);
    }

    pub fn get_extra_strings(&self, name: &str) -> &[String] {
        self.extra_strings.get(name).map_or(&[], Vec::as_slice)
    }
}

/// Exact rows to dataset, one entry per row.
///
/// Argument sets are fetched in one batch; ids the resolver does not know map to
/// [`ArgSet::EMPTY`]. Resolver failures come back unchanged.
pub async fn materialize(
    request: DataRequest,
    kind: &TrackKind,
    rows: Vec<IntervalRow>,
    resolver: &dyn ArgResolver,
) -> Result<SliceData> {
    let arg_ids: HashSet<i64> = rows.iter().map(|r| r.arg_set_id).collect();
    let resolved = if arg_ids.is_empty() {
        HashMap::new()
    } else {
        resolver.resolve_many(&arg_ids).await?
    };

    let mut data = SliceData::with_capacity(request, rows.len());
    let mut submission_ids = Vec::new();
    for row in rows {
        let mut title = row.name.clone();
        if row.depth == 0 {
            if let Some(marker) = row.debug_marker() {
                title.push('[');
                title.push_str(marker);
                title.push(']');
            }
        }
        if let Some(submission) = row.submission_id() {
            submission_ids.push(submission);
        }

        data.ids.push(row.id);
        data.starts.push(row.start);
        data.ends.push(row.end());
        data.depths.push(row.depth);
        data.titles.push(title);
        data.categories.push(row.category);
        data.args
            .push(resolved.get(&row.arg_set_id).cloned().unwrap_or_default());
    }
    if kind.is_gpu() {
        data.put_extra_longs(SUBMISSION_IDS, submission_ids);
    }

    debug!(rows = data.len(), "materialized exact slices");
    Ok(data)
}

/// Merged buckets to dataset. Buckets carry no id, category or arguments.
pub fn materialize_merged(request: DataRequest, kind: &TrackKind, merged: Vec<MergedRow>) -> SliceData {
    let mut data = SliceData::with_capacity(request, merged.len());
    let mut concated = Vec::with_capacity(merged.len());
    let mut submission_ids = Vec::with_capacity(merged.len());
    for bucket in merged {
        data.ids.push(-1);
        data.starts.push(bucket.start);
        data.ends.push(bucket.end);
        data.depths.push(bucket.depth);
        data.titles.push(bucket.title());
        data.categories.push(String::new());
        data.args.push(ArgSet::EMPTY);
        concated.push(bucket.concated_ids());
        submission_ids.push(bucket.submission_id.unwrap_or_default());
    }
    data.put_extra_strings(CONCATED_IDS, concated);
    if kind.is_gpu() {
        data.put_extra_longs(SUBMISSION_IDS, submission_ids);
    }

    debug!(buckets = data.len(), "materialized merged slices");
    data
}
