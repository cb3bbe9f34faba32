//! Per-invocation frame deduplication.

use std::collections::HashSet;
use std::hash::Hash;

use crate::domain::DocumentId;

/// Traversal path that entered a frame.
///
/// A frame reached by a specific frame-scoped rule and by generic recursion is
/// entered once per lane; within a lane every frame is entered at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    /// The n-th frame-scoped directive of the set.
    Scoped(usize),
    /// Normal-directive recursion.
    Generic,
}

/// Frame identities seen during one top-level invocation.
#[derive(Debug)]
pub struct VisitedSet<E> {
    seen: HashSet<(Lane, DocumentId, E)>,
}

impl<E: Copy + Eq + Hash> Default for VisitedSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Copy + Eq + Hash> VisitedSet<E> {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    /// Mark the frame as visited in `lane`. Returns `false` if it already was.
    pub fn mark(&mut self, lane: Lane, doc: DocumentId, frame: E) -> bool {
        self.seen.insert((lane, doc, frame))
    }

    pub fn contains(&self, lane: Lane, doc: DocumentId, frame: E) -> bool {
        self.seen.contains(&(lane, doc, frame))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use generational_arena::Arena;

    #[test]
    fn given_frame_marked_when_marking_again_in_same_lane_then_rejects() {
        let mut arena = Arena::new();
        let doc = DocumentId::new(arena.insert(()));
        let mut visited = VisitedSet::new();

        assert!(visited.mark(Lane::Generic, doc, 7_u32));
        assert!(!visited.mark(Lane::Generic, doc, 7_u32));
        assert!(visited.mark(Lane::Scoped(0), doc, 7_u32));
        assert_eq!(visited.len(), 2);
    }
}
