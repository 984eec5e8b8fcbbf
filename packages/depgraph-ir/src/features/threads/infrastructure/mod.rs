pub mod regions;

pub use regions::ThreadRegionAnalysis;
