//! Domain model of the system dependence graph.

pub mod block;
pub mod graph;
pub mod node;

pub use block::{BlockEdge, SDGBlock, SDGBlockId, ARTIFICIAL_LABEL};
pub use graph::{CallParams, FormalParams, FunctionSdg, Sdg};
pub use node::{DepKind, EdgeLists, SDGNode, SDGNodeId, SDGNodeKind, DEP_KINDS};
