//! Selections: a single slice, or an aggregated set of them with its call tree

use std::collections::HashSet;

use crate::call_tree::{Node, SlicesBuilder};
use crate::slice::{Slice, TimeSpan};

/// Something the user picked on the timeline
pub trait Selection {
    fn title(&self) -> &str;

    /// Whether slice `id` is part of this selection
    fn contains(&self, id: i64) -> bool;

    /// Time ranges covered, one per slice; instant slices contribute none
    fn ranges(&self) -> Vec<TimeSpan>;

    /// A builder seeded with this selection, ready to combine with more
    fn builder(&self) -> SlicesBuilder;

    /// Smallest span covering every range
    fn range(&self) -> Option<TimeSpan> {
        self.ranges().into_iter().reduce(TimeSpan::union)
    }
}

impl Selection for Slice {
    fn title(&self) -> &str {
        Slice::title(self)
    }

    fn contains(&self, id: i64) -> bool {
        self.id == id
    }

    fn ranges(&self) -> Vec<TimeSpan> {
        self.range().into_iter().collect()
    }

    fn builder(&self) -> SlicesBuilder {
        let mut builder = SlicesBuilder::empty();
        builder.add(self.clone());
        builder
    }
}

/// A finished multi-slice selection
#[derive(Debug, Clone)]
pub struct Slices {
    slices: Vec<Slice>,
    title: Option<&'static str>,
    nodes: Vec<Node>,
    slice_keys: HashSet<i64>,
}

impl Slices {
    pub(crate) fn new(
        slices: Vec<Slice>,
        title: Option<&'static str>,
        nodes: Vec<Node>,
        slice_keys: HashSet<i64>,
    ) -> Self {
        Self {
            slices,
            title,
            nodes,
            slice_keys,
        }
    }

    /// Top level call-tree nodes, longest first
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

impl Selection for Slices {
    fn title(&self) -> &str {
        self.title.unwrap_or("")
    }

    fn contains(&self, id: i64) -> bool {
        self.slice_keys.contains(&id)
    }

    fn ranges(&self) -> Vec<TimeSpan> {
        self.slices.iter().filter_map(Slice::range).collect()
    }

    fn builder(&self) -> SlicesBuilder {
        let mut builder = SlicesBuilder::empty();
        for slice in &self.slices {
            builder.add(slice.clone());
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgSet;
    use crate::slice::{SliceKind, ThreadInfo};

    fn slice(id: i64, time: i64, dur: i64, stack_id: i64, parent_id: i64) -> Slice {
        Slice {
            id,
            time,
            dur,
            category: "cat".into(),
            name: format!("s{stack_id}"),
            depth: 0,
            stack_id,
            parent_id,
            args: ArgSet::EMPTY,
            kind: SliceKind::Thread(ThreadInfo {
                track_id: 1,
                tid: 1,
                name: "main".into(),
            }),
        }
    }

    #[test]
    fn test_single_slice_selection() {
        let s = slice(4, 100, 50, 1, 0);
        assert!(Selection::contains(&s, 4));
        assert!(!Selection::contains(&s, 5));
        assert_eq!(Selection::title(&s), "Thread Slices");
        assert_eq!(s.ranges(), vec![TimeSpan::new(100, 150)]);

        let tree = s.builder().build().unwrap();
        assert_eq!(tree.nodes().len(), 1);
        assert_eq!(tree.nodes()[0].dur(), 50);
    }

    #[test]
    fn test_instant_slice_has_no_range() {
        let s = slice(4, 100, 0, 1, 0);
        assert!(s.ranges().is_empty());
        assert_eq!(Selection::range(&s), None);
    }

    #[test]
    fn test_aggregate_membership_and_range() {
        let slices = SlicesBuilder::new(vec![
            slice(1, 100, 50, 1, 0),
            slice(2, 400, 0, 2, 1),
            slice(3, 300, 20, 3, 1),
        ])
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(slices.len(), 3);
        assert!(slices.contains(2));
        assert!(!slices.contains(9));
        assert_eq!(slices.ranges().len(), 2);
        assert_eq!(slices.range(), Some(TimeSpan::new(100, 320)));
    }

    #[test]
    fn test_builder_round_trip_extends_selection() {
        let first = SlicesBuilder::new(vec![slice(1, 0, 100, 1, 0)])
            .unwrap()
            .build()
            .unwrap();
        let more = slice(2, 10, 40, 2, 1).builder();
        let combined = first.builder().combine(more).unwrap().build().unwrap();

        assert_eq!(combined.len(), 2);
        assert_eq!(combined.nodes()[0].dur(), 100);
        assert_eq!(combined.nodes()[0].self_dur(), 60);
        assert!(combined.contains(1) && combined.contains(2));
    }
}
