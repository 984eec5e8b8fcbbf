//! Domain model of the pointer analysis: pointers, points-to sets, the
//! pointer-graph arena and abstract memory objects.

pub mod memory_object;
pub mod pointer;
pub mod pointer_graph;

pub use memory_object::MemoryObject;
pub use pointer::{Pointer, PointsToSet};
pub use pointer_graph::{
    AllocAttrs, PGNode, PGNodeId, PGNodeType, PGSubgraph, PGSubgraphId, PointerGraph,
    INVALIDATED_ID, NULL_ID, UNKNOWN_MEMORY_ID,
};
