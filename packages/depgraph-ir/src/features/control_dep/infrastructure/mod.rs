pub mod cfg;
pub mod interproc;
pub mod ntscd;
pub mod post_dominance;

pub use cfg::FunctionCfg;
pub use interproc::NoReturnAnalysis;
pub use post_dominance::BlockDeps;
