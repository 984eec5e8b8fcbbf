pub mod analysis;
pub mod options;

pub use analysis::DataDependenceAnalysis;
pub use options::{DDAOptions, DdaFlavor, UndefinedFunsBehavior};
