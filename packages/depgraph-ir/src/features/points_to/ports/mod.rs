//! The narrow interface the rest of the engine sees from the pointer
//! analysis. An external engine (e.g. an SVF-backed one) can stand in by
//! implementing `PointsToQuery`.

use crate::shared::models::{FunctionId, Value};
use crate::shared::offset::Offset;

/// One entry of a resolved points-to set: the IR value of the allocation
/// site (or function) plus the byte offset into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedPointer {
    pub value: Value,
    pub offset: Offset,
}

/// A points-to set mapped back onto IR values.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPointsTo {
    pub pointers: Vec<ResolvedPointer>,
    pub has_unknown: bool,
    pub has_null: bool,
    pub has_invalidated: bool,
}

impl ResolvedPointsTo {
    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty() && !self.has_unknown && !self.has_null && !self.has_invalidated
    }
}

/// Query interface of a pointer analysis.
pub trait PointsToQuery {
    /// The points-to set of `value`, or `None` when the analysis has no
    /// node for the value (the value is not pointer-relevant).
    fn points_to(&self, value: Value) -> Option<ResolvedPointsTo>;

    /// Functions that a call through `value` may reach, according to the
    /// points-to set. Does not filter by prototype compatibility; the
    /// caller applies the call-compat check.
    fn functions_pointed_by(&self, value: Value) -> Vec<FunctionId> {
        let Some(pts) = self.points_to(value) else {
            return Vec::new();
        };
        let mut funcs = Vec::new();
        for ptr in pts.pointers {
            if let Value::Function(fid) = ptr.value {
                if !funcs.contains(&fid) {
                    funcs.push(fid);
                }
            }
        }
        funcs
    }
}
