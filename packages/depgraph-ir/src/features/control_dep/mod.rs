//! Control-dependence analysis: the classic post-dominator construction
//! and the non-termination sensitive family, plus interprocedural
//! no-return propagation.

pub mod application;
pub mod infrastructure;

pub use application::{CDOptions, CdAlgorithm, ControlDependenceAnalysis};
pub use infrastructure::NoReturnAnalysis;
