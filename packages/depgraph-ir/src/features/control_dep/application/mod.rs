pub mod analysis;
pub mod options;

pub use analysis::ControlDependenceAnalysis;
pub use options::{CDOptions, CdAlgorithm};
