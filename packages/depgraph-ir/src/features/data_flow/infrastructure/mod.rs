pub mod memory_ssa;
pub mod reaching_definitions;

pub use memory_ssa::{MemorySsaEngine, SsaSummary};
pub use reaching_definitions::ReachingDefinitionsEngine;
