//! Slice rows and the thread / GPU-queue variants they come in

use crate::args::ArgSet;
use crate::error::{Error, QueryError, Result};
use crate::query::Row;

/// Columns every slice query selects, in positional order
pub const BASE_COLUMNS: &str =
    "id, ts, dur, category, name, depth, stack_id, parent_stack_id, arg_set_id";

/// Extra columns selected by GPU queue tracks, following [`BASE_COLUMNS`]
pub const GPU_COLUMNS: &str = "render_target, render_target_name, render_pass, render_pass_name, \
     command_buffer, command_buffer_name, submission_id";

/// Half-open time interval `[start, end)` in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSpan {
    pub start: i64,
    pub end: i64,
}

impl TimeSpan {
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }

    /// Empty and inverted spans are rejected, as are spans too long to measure in an `i64`
    pub fn validate(self) -> Result<Self> {
        if self.end <= self.start || self.end.checked_sub(self.start).is_none() {
            return Err(Error::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(self)
    }

    /// Smallest span covering both
    pub fn union(self, other: TimeSpan) -> TimeSpan {
        TimeSpan::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub track_id: i64,
    pub tid: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub track_id: i64,
    pub id: i64,
    pub name: String,
}

/// Which kind of timeline a track draws
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackKind {
    Thread(ThreadInfo),
    GpuQueue(QueueInfo),
}

impl TrackKind {
    pub fn track_id(&self) -> i64 {
        match self {
            TrackKind::Thread(t) => t.track_id,
            TrackKind::GpuQueue(q) => q.track_id,
        }
    }

    /// Backing table in the trace store
    pub fn table(&self) -> &'static str {
        match self {
            TrackKind::Thread(_) => "slice",
            TrackKind::GpuQueue(_) => "gpu_slice",
        }
    }

    pub fn columns(&self) -> String {
        match self {
            TrackKind::Thread(_) => BASE_COLUMNS.to_string(),
            TrackKind::GpuQueue(_) => format!("{BASE_COLUMNS}, {GPU_COLUMNS}"),
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, TrackKind::GpuQueue(_))
    }
}

/// Render pass bookkeeping carried by GPU queue slices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderStageInfo {
    pub frame_buffer_handle: i64,
    pub frame_buffer_name: String,
    pub render_pass_handle: i64,
    pub render_pass_name: String,
    pub command_buffer_handle: i64,
    pub command_buffer_name: String,
    pub submission_id: i64,
}

impl RenderStageInfo {
    fn from_row(row: &Row) -> Result<Self, QueryError> {
        Ok(Self {
            frame_buffer_handle: row.get_long(9)?,
            frame_buffer_name: row.get_string(10)?,
            render_pass_handle: row.get_long(11)?,
            render_pass_name: row.get_string(12)?,
            command_buffer_handle: row.get_long(13)?,
            command_buffer_name: row.get_string(14)?,
            submission_id: row.get_long(15)?,
        })
    }
}

/// One stored slice as read from a query, before argument resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalRow {
    pub id: i64,
    pub start: i64,
    pub dur: i64,
    pub category: String,
    pub name: String,
    pub depth: i32,
    pub stack_id: i64,
    pub parent_stack_id: i64,
    pub arg_set_id: i64,
    pub render_stage: Option<RenderStageInfo>,
}

impl IntervalRow {
    pub fn from_row(row: &Row, kind: &TrackKind) -> Result<Self, QueryError> {
        let render_stage = match kind {
            TrackKind::Thread(_) => None,
            TrackKind::GpuQueue(_) => Some(RenderStageInfo::from_row(row)?),
        };
        Ok(Self {
            id: row.get_long(0)?,
            start: row.get_long(1)?,
            dur: row.get_long(2)?,
            category: row.get_string(3)?,
            name: row.get_string(4)?,
            depth: row.get_int(5)?,
            stack_id: row.get_long(6)?,
            parent_stack_id: row.get_long(7)?,
            arg_set_id: row.get_long(8)?,
            render_stage,
        })
    }

    pub fn end(&self) -> i64 {
        self.start.saturating_add(self.dur)
    }

    /// Display annotation for top level rows. GPU queues store it in the render target name.
    pub fn debug_marker(&self) -> Option<&str> {
        self.render_stage
            .as_ref()
            .map(|r| r.frame_buffer_name.as_str())
            .filter(|m| !m.is_empty())
    }

    pub fn submission_id(&self) -> Option<i64> {
        self.render_stage.as_ref().map(|r| r.submission_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceKind {
    Thread(ThreadInfo),
    Gpu(RenderStageInfo),
}

/// A fully resolved slice, the unit of selection
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub id: i64,
    pub time: i64,
    pub dur: i64,
    pub category: String,
    pub name: String,
    pub depth: i32,
    pub stack_id: i64,
    pub parent_id: i64,
    pub args: ArgSet,
    pub kind: SliceKind,
}

pub const THREAD_SLICES_TITLE: &str = "Thread Slices";
pub const GPU_SLICES_TITLE: &str = "GPU Queue Events";

impl Slice {
    pub fn new(row: IntervalRow, args: ArgSet, track: &TrackKind) -> Self {
        let kind = match (track, row.render_stage) {
            (_, Some(stage)) => SliceKind::Gpu(stage),
            (TrackKind::Thread(thread), None) => SliceKind::Thread(thread.clone()),
            (TrackKind::GpuQueue(_), None) => SliceKind::Gpu(RenderStageInfo::default()),
        };
        Self {
            id: row.id,
            time: row.start,
            dur: row.dur,
            category: row.category,
            name: row.name,
            depth: row.depth,
            stack_id: row.stack_id,
            parent_id: row.parent_stack_id,
            args,
            kind,
        }
    }

    pub fn title(&self) -> &'static str {
        match self.kind {
            SliceKind::Thread(_) => THREAD_SLICES_TITLE,
            SliceKind::Gpu(_) => GPU_SLICES_TITLE,
        }
    }

    pub fn thread(&self) -> Option<&ThreadInfo> {
        match &self.kind {
            SliceKind::Thread(t) => Some(t),
            SliceKind::Gpu(_) => None,
        }
    }

    pub fn render_stage_info(&self) -> Option<&RenderStageInfo> {
        match &self.kind {
            SliceKind::Gpu(r) => Some(r),
            SliceKind::Thread(_) => None,
        }
    }

    /// Instant slices have no range
    pub fn range(&self) -> Option<TimeSpan> {
        (self.dur > 0).then(|| TimeSpan::new(self.time, self.time.saturating_add(self.dur)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Value;

    fn thread() -> TrackKind {
        TrackKind::Thread(ThreadInfo {
            track_id: 3,
            tid: 1201,
            name: "RenderThread".into(),
        })
    }

    fn base_values() -> Vec<Value> {
        vec![
            Value::Long(5),
            Value::Long(1_000),
            Value::Long(250),
            Value::Text("gfx".into()),
            Value::Text("DrawFrame".into()),
            Value::Long(0),
            Value::Long(77),
            Value::Long(0),
            Value::Long(9),
        ]
    }

    #[test]
    fn test_span_validation() {
        assert!(TimeSpan::new(10, 20).validate().is_ok());
        assert!(matches!(
            TimeSpan::new(20, 20).validate(),
            Err(Error::InvalidRange { start: 20, end: 20 })
        ));
        assert!(TimeSpan::new(30, 20).validate().is_err());
        assert_eq!(TimeSpan::new(0, 5).union(TimeSpan::new(3, 9)), TimeSpan::new(0, 9));
    }

    #[test]
    fn test_thread_row() {
        let row = IntervalRow::from_row(&Row::new(base_values()), &thread()).unwrap();
        assert_eq!(row.id, 5);
        assert_eq!(row.end(), 1_250);
        assert_eq!(row.stack_id, 77);
        assert_eq!(row.debug_marker(), None);

        let slice = Slice::new(row, ArgSet::EMPTY, &thread());
        assert_eq!(slice.title(), THREAD_SLICES_TITLE);
        assert_eq!(slice.thread().map(|t| t.tid), Some(1201));
        assert!(slice.render_stage_info().is_none());
        assert_eq!(slice.range(), Some(TimeSpan::new(1_000, 1_250)));
    }

    #[test]
    fn test_gpu_row() {
        let kind = TrackKind::GpuQueue(QueueInfo {
            track_id: 4,
            id: 0,
            name: "Graphics".into(),
        });
        let mut values = base_values();
        values.extend([
            Value::Long(0xa0),
            Value::Text("swapchain".into()),
            Value::Long(0xb0),
            Value::Text("main pass".into()),
            Value::Long(0xc0),
            Value::Null,
            Value::Long(31),
        ]);
        let row = IntervalRow::from_row(&Row::new(values), &kind).unwrap();
        assert_eq!(row.debug_marker(), Some("swapchain"));
        assert_eq!(row.submission_id(), Some(31));

        let slice = Slice::new(row, ArgSet::EMPTY, &kind);
        assert_eq!(slice.title(), GPU_SLICES_TITLE);
        let stage = slice.render_stage_info().unwrap();
        assert_eq!(stage.render_pass_name, "main pass");
        assert_eq!(stage.command_buffer_name, "");
    }

    #[test]
    fn test_short_gpu_row_is_an_error() {
        let kind = TrackKind::GpuQueue(QueueInfo {
            track_id: 4,
            id: 0,
            name: "Graphics".into(),
        });
        assert_eq!(
            IntervalRow::from_row(&Row::new(base_values()), &kind),
            Err(QueryError::ColumnIndex(9))
        );
    }

    #[test]
    fn test_instant_slice_has_no_range() {
        let mut row = IntervalRow::from_row(&Row::new(base_values()), &thread()).unwrap();
        row.dur = 0;
        assert_eq!(Slice::new(row, ArgSet::EMPTY, &thread()).range(), None);
    }
}
