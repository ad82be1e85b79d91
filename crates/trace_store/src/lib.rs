//! SQLite trace storage
//!
//! Holds thread and GPU-queue slices plus their argument sets, and serves them to
//! [`slice_track::SliceTrack`] through the [`slice_track::QueryEngine`] and
//! [`slice_track::ArgResolver`] contracts.

pub mod database;
pub mod recorder;

pub use database::{GpuSliceRecord, SliceRecord, TraceStore};
pub use recorder::{Recorded, ScopeEvent, SliceRecorder};
