//! Property tests for the offset lattice and the points-to sets.

use depgraph_ir::features::points_to::domain::{PGNodeId, Pointer, PointsToSet};
use depgraph_ir::shared::offset::{Offset, OffsetInterval};
use proptest::prelude::*;

fn offsets() -> impl Strategy<Value = Offset> {
    prop_oneof![
        (0u64..1u64 << 48).prop_map(Offset::new),
        Just(Offset::UNKNOWN),
    ]
}

proptest! {
    /// The unknown top element absorbs every operation.
    #[test]
    fn unknown_is_absorbing(o in offsets()) {
        prop_assert_eq!(Offset::UNKNOWN + o, Offset::UNKNOWN);
        prop_assert_eq!(o + Offset::UNKNOWN, Offset::UNKNOWN);
        prop_assert_eq!(Offset::UNKNOWN - o, Offset::UNKNOWN);
        prop_assert_eq!(Offset::UNKNOWN * o, Offset::UNKNOWN);
        prop_assert_eq!(Offset::UNKNOWN.min(o), Offset::UNKNOWN);
        prop_assert_eq!(Offset::UNKNOWN.max(o), Offset::UNKNOWN);
    }

    /// Concrete arithmetic either matches plain integers or saturates.
    #[test]
    fn addition_is_exact_or_saturates(a in 0u64..1 << 48, b in 0u64..1 << 48) {
        let sum = Offset::new(a) + Offset::new(b);
        prop_assert_eq!(sum, Offset::new(a + b));
    }

    /// Interval overlap is symmetric, and unknown intervals overlap
    /// everything.
    #[test]
    fn overlap_is_symmetric(
        a_start in offsets(), a_len in offsets(),
        b_start in offsets(), b_len in offsets(),
    ) {
        let a = OffsetInterval::new(a_start, a_len);
        let b = OffsetInterval::new(b_start, b_len);
        prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        if a.is_unknown() {
            prop_assert!(a.overlaps(&b));
        }
    }

    /// Points-to insertion is monotone: union never loses pointers.
    #[test]
    fn points_to_union_is_monotone(
        targets in prop::collection::vec((0u32..64, 0u64..256), 0..32),
        extra in prop::collection::vec((0u32..64, 0u64..256), 0..32),
    ) {
        let mut set = PointsToSet::new();
        for (t, o) in &targets {
            set.insert(Pointer::new(PGNodeId(*t + 10), Offset::new(*o)));
        }
        let before: Vec<Pointer> = set.iter().copied().collect();

        let mut other = PointsToSet::new();
        for (t, o) in &extra {
            other.insert(Pointer::new(PGNodeId(*t + 10), Offset::new(*o)));
        }
        set.union_with(&other);

        for ptr in before {
            prop_assert!(set.contains(&ptr));
        }
        for ptr in other.iter() {
            prop_assert!(set.contains(ptr));
        }
    }
}
