//! Memory objects: the per-allocation-site `Offset -> set<Pointer>`
//! mapping the solvers read and write through.

use rustc_hash::FxHashMap;

use crate::shared::offset::Offset;

use super::pointer::{Pointer, PointsToSet};
use super::pointer_graph::PGNodeId;

/// The abstract memory of one allocation site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryObject {
    /// The allocation-site node this object belongs to.
    pub site: Option<PGNodeId>,
    values: FxHashMap<Offset, PointsToSet>,
}

impl MemoryObject {
    pub fn new(site: PGNodeId) -> Self {
        MemoryObject {
            site: Some(site),
            values: FxHashMap::default(),
        }
    }

    /// Record that the bytes at `offset` may hold `ptr`. Returns whether
    /// the object changed.
    pub fn add_pointer(&mut self, offset: Offset, ptr: Pointer) -> bool {
        self.values.entry(offset).or_default().insert(ptr)
    }

    /// Union a whole set into `offset`.
    pub fn add_pointers(&mut self, offset: Offset, pts: &PointsToSet) -> bool {
        if pts.is_empty() {
            return false;
        }
        self.values.entry(offset).or_default().union_with(pts)
    }

    /// Replace everything stored at concrete `offset` (a strong update in
    /// the flow-sensitive solver).
    pub fn set_pointers(&mut self, offset: Offset, pts: PointsToSet) {
        self.values.insert(offset, pts);
    }

    /// All pointers that a read at `offset` may observe. A read at an
    /// unknown offset observes every offset; a concrete read also
    /// observes whatever was written at the unknown offset.
    pub fn pointers_at(&self, offset: Offset) -> PointsToSet {
        let mut result = PointsToSet::new();
        if offset.is_unknown() {
            for pts in self.values.values() {
                result.union_with(pts);
            }
        } else {
            if let Some(pts) = self.values.get(&offset) {
                result.union_with(pts);
            }
            if let Some(pts) = self.values.get(&Offset::UNKNOWN) {
                result.union_with(pts);
            }
        }
        result
    }

    /// Union another object into this one; returns whether this object
    /// changed. This is the join of the flow-sensitive memory maps.
    pub fn merge(&mut self, other: &MemoryObject) -> bool {
        let mut changed = false;
        for (off, pts) in &other.values {
            changed |= self.values.entry(*off).or_default().union_with(pts);
        }
        changed
    }

    /// Offsets that have at least one pointer recorded.
    pub fn offsets(&self) -> impl Iterator<Item = (&Offset, &PointsToSet)> {
        self.values.iter()
    }

    /// Replace stored pointers into `target` by the invalidated sentinel.
    pub fn invalidate_target(&mut self, target: PGNodeId) -> bool {
        let mut changed = false;
        for pts in self.values.values_mut() {
            changed |= pts.replace_target_with_invalidated(target);
        }
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::points_to::domain::pointer_graph::PGNodeId;

    fn p(target: u32, off: u64) -> Pointer {
        Pointer::new(PGNodeId(target), Offset::new(off))
    }

    #[test]
    fn concrete_read_sees_unknown_writes() {
        let mut mo = MemoryObject::new(PGNodeId(10));
        mo.add_pointer(Offset::new(0), p(20, 0));
        mo.add_pointer(Offset::UNKNOWN, p(30, 0));

        let at_zero = mo.pointers_at(Offset::new(0));
        assert!(at_zero.contains(&p(20, 0)));
        assert!(at_zero.contains(&p(30, 0)));

        let at_eight = mo.pointers_at(Offset::new(8));
        assert!(!at_eight.contains(&p(20, 0)));
        assert!(at_eight.contains(&p(30, 0)));
    }

    #[test]
    fn unknown_read_sees_everything() {
        let mut mo = MemoryObject::new(PGNodeId(10));
        mo.add_pointer(Offset::new(0), p(20, 0));
        mo.add_pointer(Offset::new(8), p(21, 0));

        let all = mo.pointers_at(Offset::UNKNOWN);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn merge_is_monotone() {
        let mut a = MemoryObject::new(PGNodeId(1));
        a.add_pointer(Offset::new(0), p(5, 0));

        let mut b = MemoryObject::new(PGNodeId(1));
        b.add_pointer(Offset::new(0), p(6, 0));

        assert!(a.merge(&b));
        assert!(!a.merge(&b));
        assert_eq!(a.pointers_at(Offset::new(0)).len(), 2);
    }
}
