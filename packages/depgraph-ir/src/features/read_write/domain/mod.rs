//! Domain model of the read/write graph.

pub mod rw_graph;
pub mod rw_node;

pub use rw_graph::{RWBlock, RWSubgraph, ReadWriteGraph};
pub use rw_node::{
    DefSite, RWBlockId, RWNode, RWNodeId, RWNodeType, RWSubgraphId, UseSite, RW_UNKNOWN_MEMORY,
};
