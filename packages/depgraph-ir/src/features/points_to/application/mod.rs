pub mod analyzer;
pub mod options;

pub use analyzer::PointerAnalysis;
pub use options::{AllocationKind, PTAOptions, PtaFlavor};
