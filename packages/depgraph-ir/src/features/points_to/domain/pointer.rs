//! Pointers and points-to sets.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::shared::offset::Offset;

use super::pointer_graph::{PGNodeId, INVALIDATED_ID, NULL_ID, UNKNOWN_MEMORY_ID};

/// An abstract pointer: a target node in the pointer graph plus a byte
/// offset into the object the target stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub target: PGNodeId,
    pub offset: Offset,
}

impl Pointer {
    pub fn new(target: PGNodeId, offset: Offset) -> Self {
        Pointer { target, offset }
    }

    /// The null pointer singleton.
    pub fn null() -> Self {
        Pointer {
            target: NULL_ID,
            offset: Offset::ZERO,
        }
    }

    /// Pointer to unknown memory at an unknown offset.
    pub fn unknown() -> Self {
        Pointer {
            target: UNKNOWN_MEMORY_ID,
            offset: Offset::UNKNOWN,
        }
    }

    /// Pointer to memory whose lifetime has ended (flow-sensitive solver
    /// with invalidation only).
    pub fn invalidated() -> Self {
        Pointer {
            target: INVALIDATED_ID,
            offset: Offset::ZERO,
        }
    }

    pub fn is_null(&self) -> bool {
        self.target == NULL_ID
    }

    pub fn is_unknown(&self) -> bool {
        self.target == UNKNOWN_MEMORY_ID
    }

    pub fn is_invalidated(&self) -> bool {
        self.target == INVALIDATED_ID
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ptr(n{} + {})", self.target.0, self.offset)
    }
}

/// A set of abstract pointers. Insertion is monotone; iteration order is
/// irrelevant to correctness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointsToSet {
    pointers: FxHashSet<Pointer>,
    has_unknown: bool,
}

impl PointsToSet {
    pub fn new() -> Self {
        PointsToSet::default()
    }

    /// Add a pointer; returns whether the set grew.
    pub fn insert(&mut self, ptr: Pointer) -> bool {
        if ptr.is_unknown() {
            self.has_unknown = true;
        }
        self.pointers.insert(ptr)
    }

    /// Union `other` into `self`; returns whether the set grew.
    pub fn union_with(&mut self, other: &PointsToSet) -> bool {
        let mut changed = false;
        for ptr in &other.pointers {
            changed |= self.insert(*ptr);
        }
        changed
    }

    pub fn contains(&self, ptr: &Pointer) -> bool {
        self.pointers.contains(ptr)
    }

    pub fn has_unknown(&self) -> bool {
        self.has_unknown
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pointer> {
        self.pointers.iter()
    }

    /// Replace every pointer into `target` by the invalidated sentinel.
    /// Returns whether the set changed. Used by the invalidation-aware
    /// flow-sensitive solver when a lifetime ends.
    pub fn replace_target_with_invalidated(&mut self, target: PGNodeId) -> bool {
        if !self.pointers.iter().any(|p| p.target == target) {
            return false;
        }
        self.pointers.retain(|p| p.target != target);
        self.pointers.insert(Pointer::invalidated());
        true
    }

    /// The single pointer of a singleton set.
    pub fn as_singleton(&self) -> Option<Pointer> {
        if self.pointers.len() == 1 {
            self.pointers.iter().next().copied()
        } else {
            None
        }
    }
}

impl FromIterator<Pointer> for PointsToSet {
    fn from_iter<I: IntoIterator<Item = Pointer>>(iter: I) -> Self {
        let mut set = PointsToSet::new();
        for ptr in iter {
            set.insert(ptr);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_monotone() {
        let mut pts = PointsToSet::new();
        assert!(pts.insert(Pointer::new(PGNodeId(5), Offset::ZERO)));
        assert!(!pts.insert(Pointer::new(PGNodeId(5), Offset::ZERO)));
        assert_eq!(pts.len(), 1);
    }

    #[test]
    fn unknown_sets_the_flag() {
        let mut pts = PointsToSet::new();
        assert!(!pts.has_unknown());
        pts.insert(Pointer::unknown());
        assert!(pts.has_unknown());
    }

    #[test]
    fn union_reports_growth() {
        let mut a = PointsToSet::new();
        a.insert(Pointer::null());

        let mut b = PointsToSet::new();
        b.insert(Pointer::null());
        assert!(!a.union_with(&b));

        b.insert(Pointer::new(PGNodeId(9), Offset::new(4)));
        assert!(a.union_with(&b));
    }
}
