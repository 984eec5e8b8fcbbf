//! The interface the dependence-graph assembly consumes from a
//! data-dependence analysis.

use crate::shared::models::Value;
use crate::shared::offset::Offset;

/// Def-use queries in IR terms. The four queries of the engine: the defs
/// of a use, the defs of an explicit byte range, and the use/def
/// predicates.
pub trait DefUseQuery {
    /// All definitions reaching the use-sites of `use_value`.
    fn definitions_for(&mut self, use_value: Value) -> Vec<Value>;

    /// Definitions of bytes `[off, off+len)` of `mem` reaching `at`.
    fn definitions_in_range(&mut self, at: Value, mem: Value, off: Offset, len: Offset)
        -> Vec<Value>;

    fn is_use(&self, value: Value) -> bool;

    fn is_def(&self, value: Value) -> bool;
}
