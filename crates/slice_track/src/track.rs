//! A timeline track of slices backed by a query engine

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::args::{ArgResolver, ArgSet};
use crate::config::TrackConfig;
use crate::data::{materialize, materialize_merged, SliceData};
use crate::error::{Error, QueryError, Result};
use crate::quantize;
use crate::query::{create_view, drop_view, QueryEngine};
use crate::slice::{IntervalRow, QueueInfo, Slice, ThreadInfo, TimeSpan, TrackKind};
use crate::window::{DataRequest, Window};

pub struct SliceTrack {
    kind: TrackKind,
    engine: Arc<dyn QueryEngine>,
    args: Arc<dyn ArgResolver>,
    config: TrackConfig,
}

impl SliceTrack {
    pub fn for_thread(
        engine: Arc<dyn QueryEngine>,
        args: Arc<dyn ArgResolver>,
        thread: ThreadInfo,
    ) -> Self {
        Self::new(TrackKind::Thread(thread), engine, args)
    }

    pub fn for_gpu_queue(
        engine: Arc<dyn QueryEngine>,
        args: Arc<dyn ArgResolver>,
        queue: QueueInfo,
    ) -> Self {
        Self::new(TrackKind::GpuQueue(queue), engine, args)
    }

    fn new(kind: TrackKind, engine: Arc<dyn QueryEngine>, args: Arc<dyn ArgResolver>) -> Self {
        Self {
            kind,
            engine,
            args,
            config: TrackConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TrackConfig) -> Self {
        self.config = config;
        self
    }

    pub fn kind(&self) -> &TrackKind {
        &self.kind
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    /// Per-track view every query reads from
    pub fn view_name(&self) -> String {
        format!("slices_{}", self.kind.track_id())
    }

    /// (Re)create the per-track view. Must run before any other query.
    pub async fn initialize(&self) -> Result<()> {
        let view = self.view_name();
        let select = format!(
            "select {} from {} where track_id = {}",
            self.kind.columns(),
            self.kind.table(),
            self.kind.track_id()
        );
        self.engine
            .queries(&[drop_view(&view), create_view(&view, &select)])
            .await?;
        debug!(view, "initialized slice track");
        Ok(())
    }

    /// Render data for a visible window: exact rows when zoomed in, merged buckets otherwise
    #[instrument(skip(self), fields(track_id = self.kind.track_id()))]
    pub async fn compute_data(&self, request: DataRequest) -> Result<SliceData> {
        let window = Window::compute(&request, &self.config)?;
        let rows = self.rows_overlapping(window.span()).await?;
        if window.quantized {
            let merged = quantize::merge(&rows, &window, self.config.label_limit);
            Ok(materialize_merged(request, &self.kind, merged))
        } else {
            materialize(request, &self.kind, rows, self.args.as_ref()).await
        }
    }

    /// One slice with its arguments resolved
    pub async fn get_slice(&self, id: i64) -> Result<Slice> {
        let sql = format!("select {} from {} where id = {id}", self.kind.columns(), self.view_name());
        let mut rows = self.read_rows(&sql).await?;
        let row = match rows.len() {
            0 => return Err(Error::NotFound(id)),
            1 => rows.remove(0),
            n => return Err(QueryError::ExpectedOneRow(n).into()),
        };
        let args = self.args.resolve_one(row.arg_set_id).await?;
        Ok(Slice::new(row, args, &self.kind))
    }

    /// Slices named by a comma-joined id list, as carried by merged buckets
    pub async fn get_slices(&self, concated_ids: &str) -> Result<Vec<Slice>> {
        let ids = parse_id_list(concated_ids)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
        let sql = format!(
            "select {} from {} where id in ({list})",
            self.kind.columns(),
            self.view_name()
        );
        self.slices_without_args(&sql).await
    }

    /// Slices intersecting `span` with a depth in `min_depth..=max_depth`
    pub async fn get_slices_in_range(
        &self,
        span: TimeSpan,
        min_depth: i32,
        max_depth: i32,
    ) -> Result<Vec<Slice>> {
        let span = span.validate()?;
        if min_depth < 0 || min_depth > max_depth {
            return Err(Error::InvalidDepthRange {
                min: min_depth,
                max: max_depth,
            });
        }
        let sql = format!(
            "select {} from {} where ts < {} and ts + dur >= {} and depth >= {min_depth} and depth <= {max_depth}",
            self.kind.columns(),
            self.view_name(),
            span.end,
            span.start,
        );
        self.slices_without_args(&sql).await
    }

    async fn rows_overlapping(&self, span: TimeSpan) -> Result<Vec<IntervalRow>> {
        let sql = format!(
            "select {} from {} where ts >= {} - dur and ts <= {} order by ts",
            self.kind.columns(),
            self.view_name(),
            span.start,
            span.end
        );
        self.read_rows(&sql).await
    }

    async fn read_rows(&self, sql: &str) -> Result<Vec<IntervalRow>> {
        let result = self.engine.query(sql).await?;
        let rows = result
            .rows()
            .iter()
            .map(|row| IntervalRow::from_row(row, &self.kind))
            .collect::<Result<Vec<_>, QueryError>>()?;
        Ok(rows)
    }

    async fn slices_without_args(&self, sql: &str) -> Result<Vec<Slice>> {
        let rows = self.read_rows(sql).await?;
        Ok(rows
            .into_iter()
            .map(|row| Slice::new(row, ArgSet::EMPTY, &self.kind))
            .collect())
    }
}

fn parse_id_list(concated_ids: &str) -> Result<Vec<i64>> {
    if concated_ids.trim().is_empty() {
        return Ok(Vec::new());
    }
    concated_ids
        .split(',')
        .map(|id| id.trim().parse::<i64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| Error::InvalidIdList(concated_ids.to_string()))
}
