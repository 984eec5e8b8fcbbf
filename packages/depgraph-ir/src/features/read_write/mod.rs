//! The read/write graph: per-instruction def- and use-sites derived from
//! the pointer analysis, the input of the data-dependence engines.

pub mod domain;
pub mod infrastructure;

pub use domain::{DefSite, RWNode, RWNodeId, RWNodeType, ReadWriteGraph, UseSite};
pub use infrastructure::{BuiltReadWriteGraph, FunctionModel, ReadWriteGraphBuilder};
