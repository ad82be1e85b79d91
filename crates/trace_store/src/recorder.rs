//! Turns completed scope timings into slice rows
//!
//! Scopes are reported when they close, so a parent arrives after its children. The recorder
//! re-orders each batch by start time and recovers nesting from time containment: a scope's
//! parent is the innermost still-open scope on the same track that fully encloses it. Every
//! distinct call path (name plus ancestry) gets one stack id, reused across batches.

use std::collections::HashMap;

use anyhow::Result;
use slice_track::ArgSet;
use tracing::debug;

use crate::database::{SliceRecord, TraceStore};

/// A closed profiling scope
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeEvent {
    pub track_id: i64,
    pub name: String,
    pub category: String,
    pub start_ns: i64,
    pub duration_ns: i64,
    pub args: ArgSet,
}

impl ScopeEvent {
    pub fn new(track_id: i64, name: impl Into<String>, start_ns: i64, duration_ns: i64) -> Self {
        Self {
            track_id,
            name: name.into(),
            category: String::new(),
            start_ns,
            duration_ns,
            args: ArgSet::EMPTY,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_args(mut self, args: ArgSet) -> Self {
        self.args = args;
        self
    }

    fn end_ns(&self) -> i64 {
        self.start_ns + self.duration_ns
    }
}

/// Rows produced from one batch of events
#[derive(Debug, Default)]
pub struct Recorded {
    pub slices: Vec<SliceRecord>,
    pub args: Vec<(i64, ArgSet)>,
}

struct OpenScope {
    start: i64,
    end: i64,
    stack_id: i64,
}

impl OpenScope {
    fn encloses(&self, event: &ScopeEvent) -> bool {
        self.start <= event.start_ns && event.end_ns() <= self.end
    }
}

/// Assigns slice, stack and argument-set ids. Keep one recorder per store; for a store that
/// already holds slices, start from [`TraceStore::recorder`].
#[derive(Debug, Default)]
pub struct SliceRecorder {
    next_slice_id: i64,
    next_arg_set_id: i64,
    next_stack_id: i64,
    stacks: HashMap<(i64, String), i64>,
}

impl SliceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after existing ids, reusing known call paths
    pub(crate) fn resume(
        last_slice_id: i64,
        last_arg_set_id: i64,
        last_stack_id: i64,
        stacks: HashMap<(i64, String), i64>,
    ) -> Self {
        Self {
            next_slice_id: last_slice_id,
            next_arg_set_id: last_arg_set_id,
            next_stack_id: last_stack_id,
            stacks,
        }
    }

    /// Convert a batch of events. A batch must hold whole top-level scopes; nesting is not
    /// tracked across batches.
    pub fn record(&mut self, mut events: Vec<ScopeEvent>) -> Recorded {
        // Outer scopes first when two start together
        events.sort_by(|a, b| {
            (a.track_id, a.start_ns, b.duration_ns).cmp(&(b.track_id, b.start_ns, a.duration_ns))
        });

        let mut recorded = Recorded::default();
        let mut open: Vec<OpenScope> = Vec::new();
        let mut track = None;

        for event in events {
            if track != Some(event.track_id) {
                open.clear();
                track = Some(event.track_id);
            }
            while open.last().is_some_and(|scope| !scope.encloses(&event)) {
                open.pop();
            }

            let parent_stack_id = open.last().map_or(0, |scope| scope.stack_id);
            let stack_id = self.stack_id(parent_stack_id, &event.name);

            let arg_set_id = if event.args.is_empty() {
                0
            } else {
                self.next_arg_set_id += 1;
                recorded.args.push((self.next_arg_set_id, event.args.clone()));
                self.next_arg_set_id
            };

            self.next_slice_id += 1;
            recorded.slices.push(SliceRecord {
                id: self.next_slice_id,
                track_id: event.track_id,
                ts: event.start_ns,
                dur: event.duration_ns,
                category: event.category.clone(),
                name: event.name.clone(),
                depth: i32::try_from(open.len()).unwrap_or(i32::MAX),
                stack_id,
                parent_stack_id,
                arg_set_id,
            });

            open.push(OpenScope {
                start: event.start_ns,
                end: event.end_ns(),
                stack_id,
            });
        }

        debug!(
            slices = recorded.slices.len(),
            call_paths = self.stacks.len(),
            "recorded scope events"
        );
        recorded
    }

    fn stack_id(&mut self, parent_stack_id: i64, name: &str) -> i64 {
        let next = &mut self.next_stack_id;
        *self
            .stacks
            .entry((parent_stack_id, name.to_string()))
            .or_insert_with(|| {
                *next += 1;
                *next
            })
    }
}

impl TraceStore {
    /// Record a batch of events and write the resulting rows. Returns the number of slices.
    ///
    /// Tracks must be registered first. Nothing is written when any part of the batch fails.
    pub fn record(&self, recorder: &mut SliceRecorder, events: Vec<ScopeEvent>) -> Result<usize> {
        let recorded = recorder.record(events);
        self.insert_recorded(&recorded)?;
        Ok(recorded.slices.len())
    }
}
