//! Slice tracks for trace timelines
//!
//! Two jobs live here. Serving a visible window: when zoomed out far enough that individual
//! slices cannot be told apart, rows are merged into per-quantum buckets before they reach the
//! renderer. Aggregating a selection: picked slices are grouped by call path into a call tree
//! with total and self time per node, and trees built from separate selections combine without
//! double counting.
//!
//! # Usage
//!
//! ```ignore
//! let track = SliceTrack::for_thread(engine, args, thread);
//! track.initialize().await?;
//! let data = track.compute_data(DataRequest::new(TimeSpan::new(0, 1_000_000), 2_000)).await?;
//!
//! let picked = track.get_slices_in_range(TimeSpan::new(0, 500_000), 0, 8).await?;
//! let tree = SlicesBuilder::new(picked)?.build()?;
//! ```

pub mod args;
pub mod call_tree;
pub mod config;
pub mod data;
pub mod error;
pub mod quantize;
pub mod query;
pub mod selection;
pub mod slice;
pub mod track;
pub mod window;

pub use args::{ArgResolver, ArgSet, ArgValue};
pub use call_tree::{Node, SlicesBuilder};
pub use config::{ConfigError, TrackConfig};
pub use data::{SliceData, CONCATED_IDS, SUBMISSION_IDS};
pub use error::{Error, QueryError, Result};
pub use query::{QueryEngine, QueryResult, Row, Value};
pub use selection::{Selection, Slices};
pub use slice::{
    IntervalRow, QueueInfo, RenderStageInfo, Slice, SliceKind, ThreadInfo, TimeSpan, TrackKind,
};
pub use track::SliceTrack;
pub use window::{DataRequest, Window};
