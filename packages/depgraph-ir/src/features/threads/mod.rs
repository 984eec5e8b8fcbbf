//! Thread regions and may-happen-in-parallel, behind a narrow port so
//! an external analysis can replace the built-in over-approximation.

pub mod infrastructure;
pub mod ports;

pub use infrastructure::ThreadRegionAnalysis;
pub use ports::{ThreadRegionId, ThreadRegions};
