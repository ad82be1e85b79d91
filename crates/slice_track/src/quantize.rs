//! Collapses the rows of a quantized window into renderable buckets
//!
//! Rows are cut along the quantum grid and grouped by `(depth, label, quantum)`. Consecutive
//! quanta that share depth and label then fuse into one bucket, so a long slice stays one bucket
//! while two separate occurrences of the same name far apart stay two.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use tracing::trace;

use crate::slice::IntervalRow;
use crate::window::Window;

/// One merged bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    pub start: i64,
    pub end: i64,
    pub depth: i32,
    pub label: String,
    /// Set when some contributing name was cut to the label limit
    pub truncated: bool,
    /// Contributing row ids, each listed once, in first-seen order
    pub ids: Vec<i64>,
    /// Submission of the longest contributing row of the first bucket (GPU queues only)
    pub submission_id: Option<i64>,
}

impl MergedRow {
    /// Label as drawn: cut names that stand for several rows get an ellipsis
    pub fn title(&self) -> String {
        if self.truncated && self.ids.len() > 1 {
            format!("{}...", self.label)
        } else {
            self.label.clone()
        }
    }

    /// Ids joined with commas, the form accepted by slice drill-down
    pub fn concated_ids(&self) -> String {
        self.ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Per `(depth, label, quantum)` accumulator
struct Partition {
    start: i64,
    end: i64,
    truncated: bool,
    ids: Vec<i64>,
    /// `(dur, id, submission)` of the longest row seen so far
    longest: (i64, i64, Option<i64>),
}

impl Partition {
    fn new(start: i64, end: i64, row: &IntervalRow, truncated: bool) -> Self {
        Self {
            start,
            end,
            truncated,
            ids: vec![row.id],
            longest: (row.dur, row.id, row.submission_id()),
        }
    }

    fn add(&mut self, start: i64, end: i64, row: &IntervalRow, truncated: bool) {
        self.start = self.start.min(start);
        self.end = self.end.max(end);
        self.truncated |= truncated;
        self.ids.push(row.id);
        let (dur, id, _) = self.longest;
        if row.dur > dur || (row.dur == dur && row.id < id) {
            self.longest = (row.dur, row.id, row.submission_id());
        }
    }
}

struct Run {
    row: MergedRow,
    ids: IndexSet<i64>,
}

fn truncate_label(name: &str, limit: usize) -> (String, bool) {
    match name.char_indices().nth(limit) {
        Some((cut, _)) => (name[..cut].to_string(), true),
        None => (name.to_string(), false),
    }
}

/// Merge `rows` over a quantized `window`.
///
/// Output is grouped by depth and ordered by bucket start within a depth.
pub fn merge(rows: &[IntervalRow], window: &Window, label_limit: usize) -> Vec<MergedRow> {
    let mut partitions: BTreeMap<(i32, String, i64), Partition> = BTreeMap::new();

    for row in rows {
        let lo = row.start.max(window.start);
        let hi = row.end().min(window.end);
        let instant = row.dur == 0 && row.start >= window.start && row.start < window.end;
        if lo >= hi && !instant {
            continue;
        }

        let (label, truncated) = truncate_label(&row.name, label_limit);
        let first = window.quantum_index(lo);
        let last = if instant { first } else { window.quantum_index(hi - 1) };

        for q in first..=last {
            let q_start = window.quantum_start(q);
            let start = lo.max(q_start);
            let end = hi.min(q_start.saturating_add(window.quantum)).max(start);
            partitions
                .entry((row.depth, label.clone(), q))
                .and_modify(|p| p.add(start, end, row, truncated))
                .or_insert_with(|| Partition::new(start, end, row, truncated));
        }
    }

    let mut runs: Vec<Run> = Vec::new();
    let mut last_key: Option<(i32, String, i64)> = None;

    // BTreeMap order puts the quanta of one (depth, label) run next to each other
    for ((depth, label, q), partition) in partitions {
        let continues = matches!(
            &last_key,
            Some((d, l, prev)) if *d == depth && *l == label && *prev + 1 == q
        );

        if let Some(run) = runs.last_mut().filter(|_| continues) {
            run.row.start = run.row.start.min(partition.start);
            run.row.end = run.row.end.max(partition.end);
            run.row.truncated |= partition.truncated;
            run.ids.extend(partition.ids);
        } else {
            runs.push(Run {
                row: MergedRow {
                    start: partition.start,
                    end: partition.end,
                    depth,
                    label: label.clone(),
                    truncated: partition.truncated,
                    ids: Vec::new(),
                    submission_id: partition.longest.2,
                },
                ids: partition.ids.into_iter().collect(),
            });
        }
        last_key = Some((depth, label, q));
    }

    let mut merged: Vec<MergedRow> = runs
        .into_iter()
        .map(|run| MergedRow {
            ids: run.ids.into_iter().collect(),
            ..run.row
        })
        .collect();
    merged.sort_by_key(|m| (m.depth, m.start));
    trace!(rows = rows.len(), buckets = merged.len(), "merged quantized slices");
    merged
}
