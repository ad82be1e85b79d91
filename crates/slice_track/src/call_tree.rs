//! Aggregated call trees over a selection of slices
//!
//! Slices are grouped by stack id, the identity of a call path. Each group remembers the
//! duration of every slice by id, so folding the same slice in twice changes nothing and
//! builders for overlapping selections can be combined freely.

use std::collections::{HashMap, HashSet};

use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::selection::Slices;
use crate::slice::Slice;

/// One finished call-tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    dur: i64,
    self_dur: i64,
    count: usize,
    children: Vec<Node>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Summed duration of every occurrence
    pub fn dur(&self) -> i64 {
        self.dur
    }

    /// Duration not covered by children
    pub fn self_dur(&self) -> i64 {
        self.self_dur
    }

    /// Number of occurrences
    pub fn count(&self) -> usize {
        self.count
    }

    /// Children, longest first
    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

/// Accumulates the occurrences of one stack id
#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeBuilder {
    name: String,
    parent_id: i64,
    /// slice id -> slice duration
    durs: HashMap<i64, i64>,
}

impl NodeBuilder {
    fn new(name: String, parent_id: i64) -> Self {
        Self {
            name,
            parent_id,
            durs: HashMap::new(),
        }
    }

    fn add(&mut self, slice_id: i64, dur: i64) {
        self.durs.insert(slice_id, dur);
    }

    fn merge(&mut self, other: &NodeBuilder) {
        self.durs.extend(other.durs.iter().map(|(k, v)| (*k, *v)));
    }

    fn dur(&self) -> i64 {
        self.durs.values().sum()
    }
}

/// Collects a selection of slices into a call tree.
///
/// Nodes live in an arena keyed by stack id; parent links are stack ids, never ownership.
#[derive(Debug, Clone)]
pub struct SlicesBuilder {
    slices: Vec<Slice>,
    title: Option<&'static str>,
    by_stack: IndexMap<i64, NodeBuilder>,
    /// parent stack id -> child stack ids, in creation order
    by_parent: HashMap<i64, Vec<i64>>,
    /// parent ids seen, pruned of ids known to be stacks themselves
    roots: IndexSet<i64>,
    slice_keys: HashSet<i64>,
}

impl SlicesBuilder {
    /// Start a builder from `slices`. All of them must share one title.
    pub fn new(slices: impl IntoIterator<Item = Slice>) -> Result<Self> {
        let mut builder = Self::empty();
        for slice in slices {
            builder.check_title(slice.title())?;
            builder.add(slice);
        }
        Ok(builder)
    }

    pub(crate) fn empty() -> Self {
        Self {
            slices: Vec::new(),
            title: None,
            by_stack: IndexMap::new(),
            by_parent: HashMap::new(),
            roots: IndexSet::new(),
            slice_keys: HashSet::new(),
        }
    }

    fn check_title(&mut self, found: &'static str) -> Result<()> {
        match self.title {
            Some(expected) if expected != found => Err(Error::MixedSelection { expected, found }),
            _ => {
                self.title = Some(found);
                Ok(())
            }
        }
    }

    /// Caller has already checked the title
    pub(crate) fn add(&mut self, slice: Slice) {
        if self.title.is_none() {
            self.title = Some(slice.title());
        }
        let node = match self.by_stack.entry(slice.stack_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.by_parent
                    .entry(slice.parent_id)
                    .or_default()
                    .push(slice.stack_id);
                self.roots.insert(slice.parent_id);
                entry.insert(NodeBuilder::new(slice.name.clone(), slice.parent_id))
            }
        };
        node.add(slice.id, slice.dur);
        self.roots.shift_remove(&slice.stack_id);

        if self.slice_keys.insert(slice.id) {
            self.slices.push(slice);
        }
    }

    /// Fold `other` into this builder.
    ///
    /// The resulting tree does not depend on the order builders are combined in. The slice
    /// list keeps this builder's slices first.
    pub fn combine(mut self, other: SlicesBuilder) -> Result<Self> {
        if let Some(found) = other.title {
            self.check_title(found)?;
        }

        for (stack_id, theirs) in &other.by_stack {
            match self.by_stack.entry(*stack_id) {
                Entry::Occupied(mut entry) => entry.get_mut().merge(theirs),
                Entry::Vacant(entry) => {
                    self.by_parent
                        .entry(theirs.parent_id)
                        .or_default()
                        .push(*stack_id);
                    entry.insert(theirs.clone());
                }
            }
        }
        self.roots.extend(other.roots);
        for slice in other.slices {
            if self.slice_keys.insert(slice.id) {
                self.slices.push(slice);
            }
        }
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Finalize into an immutable selection.
    ///
    /// Fails with [`Error::CyclicStack`] when some stack's parent chain loops instead of
    /// ending at a top-level entry.
    pub fn build(self) -> Result<Slices> {
        let top: Vec<i64> = self
            .roots
            .iter()
            .filter(|root| !self.by_stack.contains_key(*root))
            .filter_map(|root| self.by_parent.get(root))
            .flatten()
            .copied()
            .collect();

        let mut built: HashMap<i64, Node> = HashMap::with_capacity(self.by_stack.len());
        let mut visited: HashSet<i64> = HashSet::with_capacity(self.by_stack.len());

        // Post-order walk with an explicit stack so deep call chains cannot overflow
        let mut pending: Vec<(i64, bool)> = top.iter().rev().map(|id| (*id, false)).collect();
        while let Some((stack_id, children_done)) = pending.pop() {
            let children = self.by_parent.get(&stack_id).map_or(&[][..], Vec::as_slice);
            if !children_done {
                pending.push((stack_id, true));
                pending.extend(children.iter().rev().map(|id| (*id, false)));
                continue;
            }
            let Some(builder) = self.by_stack.get(&stack_id) else {
                continue;
            };
            let nodes = children.iter().filter_map(|id| built.remove(id)).collect();
            built.insert(stack_id, finish(builder, nodes));
            visited.insert(stack_id);
        }

        // Every stack whose parent chain ends at a top-level entry was reached above
        if let Some(stack_id) = self
            .by_stack
            .keys()
            .filter(|id| !visited.contains(*id))
            .find_map(|id| cycle_member(&self.by_stack, *id))
        {
            warn!(stack_id, "call tree has a parent cycle");
            return Err(Error::CyclicStack { stack_id });
        }

        let mut nodes: Vec<Node> = top.iter().filter_map(|id| built.remove(id)).collect();
        nodes.sort_by(|a, b| b.dur.cmp(&a.dur));

        debug!(
            slices = self.slices.len(),
            stacks = self.by_stack.len(),
            roots = nodes.len(),
            "built call tree"
        );
        Ok(Slices::new(
            self.slices,
            self.title,
            nodes,
            self.slice_keys,
        ))
    }
}

/// A stack id on the loop the parent chain of `stack_id` runs into, if it loops
fn cycle_member(by_stack: &IndexMap<i64, NodeBuilder>, stack_id: i64) -> Option<i64> {
    let mut seen = HashSet::new();
    let mut current = stack_id;
    while seen.insert(current) {
        current = by_stack.get(&current)?.parent_id;
    }
    Some(current)
}

fn finish(builder: &NodeBuilder, mut children: Vec<Node>) -> Node {
    children.sort_by(|a, b| b.dur.cmp(&a.dur));
    let dur = builder.dur();
    let children_dur: i64 = children.iter().map(|c| c.dur).sum();
    if children_dur > dur {
        warn!(name = %builder.name, dur, children_dur, "children outlast their parent");
    }
    Node {
        name: builder.name.clone(),
        dur,
        self_dur: dur - children_dur,
        count: builder.durs.len(),
        children,
    }
}
