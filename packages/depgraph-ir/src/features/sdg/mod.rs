//! The system dependence graph: per-function dependence graphs over
//! instruction nodes, glued by call, parameter and thread edges.

pub mod domain;
pub mod infrastructure;

pub use domain::{
    DepKind, FunctionSdg, SDGBlock, SDGBlockId, SDGNode, SDGNodeId, SDGNodeKind, Sdg,
    ARTIFICIAL_LABEL,
};
pub use infrastructure::SdgBuilder;
