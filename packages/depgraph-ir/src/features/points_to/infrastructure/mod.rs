pub mod builder;
pub mod fi;
pub mod fs;
pub mod solver;

pub use builder::{BuiltPointerGraph, PointerGraphBuilder};
pub use fi::FlowInsensitiveModel;
pub use fs::FlowSensitiveModel;
pub use solver::{MemoryModel, PointerAnalysisSolver, SolverStats};
