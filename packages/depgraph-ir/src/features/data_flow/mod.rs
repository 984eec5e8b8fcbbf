//! Data-dependence analysis over the read/write graph, in two
//! interchangeable flavors: classical reaching definitions and a
//! memory-SSA transformation with lazy phi synthesis.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use application::{DDAOptions, DataDependenceAnalysis, DdaFlavor, UndefinedFunsBehavior};
pub use ports::DefUseQuery;
