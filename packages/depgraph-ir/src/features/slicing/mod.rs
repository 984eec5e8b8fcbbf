//! Program slicing over the system dependence graph: mark the nodes the
//! criteria transitively depend on, cut the rest, repair the CFG.

pub mod infrastructure;

pub use infrastructure::{resolve_criteria, verify_module, SliceStats, Slicer};
