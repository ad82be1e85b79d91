//! Error types for slice queries and call-tree construction

use thiserror::Error;

/// Failures reported by a [`QueryEngine`](crate::query::QueryEngine) or while reading its rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query backend failed: {0}")]
    Backend(String),

    #[error("column {column} is not a {expected}")]
    ColumnType { column: usize, expected: &'static str },

    #[error("column index {0} out of range")]
    ColumnIndex(usize),

    #[error("expected exactly one row, got {0}")]
    ExpectedOneRow(usize),
}

/// Errors surfaced by the slice track and selection APIs
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid time range: [{start}, {end})")]
    InvalidRange { start: i64, end: i64 },

    #[error("invalid resolution: {0} ns per pixel")]
    InvalidResolution(i64),

    #[error("invalid depth range: {min}..={max}")]
    InvalidDepthRange { min: i32, max: i32 },

    #[error("slice {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Upstream(#[from] QueryError),

    #[error("malformed slice id list: {0:?}")]
    InvalidIdList(String),

    #[error("cannot combine a {found:?} selection into a {expected:?} selection")]
    MixedSelection {
        expected: &'static str,
        found: &'static str,
    },

    #[error("stack {stack_id} is part of a parent cycle")]
    CyclicStack { stack_id: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
