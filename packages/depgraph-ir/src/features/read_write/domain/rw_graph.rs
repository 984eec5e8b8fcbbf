//! The read/write graph: per-function subgraphs of basic blocks whose
//! nodes record def- and use-sites.
//!
//! Block edges stay within one function. A call into a defined function
//! is followed by a `CallOut` node that carries the callee's summary
//! outputs instantiated for that call site, so the engines see the
//! callee's memory effects at the right place without walking into the
//! callee; uses that resolve to nothing locally are completed at the
//! call sites of the function's callers.

use rustc_hash::FxHashMap;

use crate::shared::models::{FunctionId, Value};

use super::rw_node::{RWBlockId, RWNode, RWNodeId, RWNodeType, RWSubgraphId, RW_UNKNOWN_MEMORY};

#[derive(Debug, Default)]
pub struct RWBlock {
    pub id: RWBlockId,
    pub nodes: Vec<RWNodeId>,
    pub successors: Vec<RWBlockId>,
    pub predecessors: Vec<RWBlockId>,
    pub subgraph: Option<RWSubgraphId>,
}

#[derive(Debug)]
pub struct RWSubgraph {
    pub id: RWSubgraphId,
    pub function: FunctionId,
    pub entry: Option<RWBlockId>,
    pub blocks: Vec<RWBlockId>,
    /// Local allocations, for forget-locals-at-return.
    pub allocations: Vec<RWNodeId>,
}

#[derive(Debug, Default)]
pub struct ReadWriteGraph {
    nodes: Vec<RWNode>,
    blocks: Vec<RWBlock>,
    subgraphs: Vec<RWSubgraph>,
    globals: Vec<RWNodeId>,
    entry: Option<RWSubgraphId>,
    values: FxHashMap<Value, RWNodeId>,
    /// Callers of each function, by call node.
    callers: FxHashMap<FunctionId, Vec<RWNodeId>>,
    /// For a `CallOut` node, the definitions inside the callee that its
    /// summary entries originate from.
    callout_origins: FxHashMap<RWNodeId, Vec<RWNodeId>>,
}

impl ReadWriteGraph {
    pub fn new() -> Self {
        let mut graph = ReadWriteGraph::default();
        // the unknown-memory sentinel at index 0
        let unknown = graph.create_node(RWNodeType::Generic);
        debug_assert_eq!(unknown, RW_UNKNOWN_MEMORY);
        graph
    }

    pub fn create_node(&mut self, ty: RWNodeType) -> RWNodeId {
        let id = RWNodeId(self.nodes.len() as u32);
        self.nodes.push(RWNode::new(id, ty));
        id
    }

    pub fn create_subgraph(&mut self, function: FunctionId) -> RWSubgraphId {
        let id = RWSubgraphId(self.subgraphs.len() as u32);
        self.subgraphs.push(RWSubgraph {
            id,
            function,
            entry: None,
            blocks: Vec::new(),
            allocations: Vec::new(),
        });
        id
    }

    pub fn create_block(&mut self, subgraph: RWSubgraphId) -> RWBlockId {
        let id = RWBlockId(self.blocks.len() as u32);
        self.blocks.push(RWBlock {
            id,
            nodes: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            subgraph: Some(subgraph),
        });
        self.subgraphs[subgraph.0 as usize].blocks.push(id);
        id
    }

    pub fn node(&self, id: RWNodeId) -> &RWNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: RWNodeId) -> &mut RWNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn block(&self, id: RWBlockId) -> &RWBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: RWBlockId) -> &mut RWBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn subgraph(&self, id: RWSubgraphId) -> &RWSubgraph {
        &self.subgraphs[id.0 as usize]
    }

    pub fn subgraph_mut(&mut self, id: RWSubgraphId) -> &mut RWSubgraph {
        &mut self.subgraphs[id.0 as usize]
    }

    pub fn subgraphs(&self) -> &[RWSubgraph] {
        &self.subgraphs
    }

    pub fn blocks(&self) -> &[RWBlock] {
        &self.blocks
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RWNode> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn append_node(&mut self, block: RWBlockId, node: RWNodeId) {
        self.blocks[block.0 as usize].nodes.push(node);
        self.nodes[node.0 as usize].block = Some(block);
    }

    pub fn add_block_edge(&mut self, from: RWBlockId, to: RWBlockId) {
        if !self.blocks[from.0 as usize].successors.contains(&to) {
            self.blocks[from.0 as usize].successors.push(to);
            self.blocks[to.0 as usize].predecessors.push(from);
        }
    }

    pub fn add_global(&mut self, node: RWNodeId) {
        self.globals.push(node);
    }

    pub fn globals(&self) -> &[RWNodeId] {
        &self.globals
    }

    pub fn set_entry(&mut self, subgraph: RWSubgraphId) {
        self.entry = Some(subgraph);
    }

    pub fn entry(&self) -> Option<RWSubgraphId> {
        self.entry
    }

    pub fn map_value(&mut self, value: Value, node: RWNodeId) {
        self.values.insert(value, node);
        if self.nodes[node.0 as usize].value.is_none() {
            self.nodes[node.0 as usize].value = Some(value);
        }
    }

    pub fn node_of(&self, value: Value) -> Option<RWNodeId> {
        self.values.get(&value).copied()
    }

    /// The block an instruction-level node sits in, if any.
    pub fn block_of_node(&self, node: RWNodeId) -> Option<RWBlockId> {
        self.nodes[node.0 as usize].block
    }

    pub fn add_caller(&mut self, callee: FunctionId, call_node: RWNodeId) {
        let callers = self.callers.entry(callee).or_default();
        if !callers.contains(&call_node) {
            callers.push(call_node);
        }
    }

    pub fn callers_of(&self, callee: FunctionId) -> &[RWNodeId] {
        self.callers.get(&callee).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_callout_origins(&mut self, callout: RWNodeId, origins: impl IntoIterator<Item = RWNodeId>) {
        let list = self.callout_origins.entry(callout).or_default();
        for origin in origins {
            if !list.contains(&origin) {
                list.push(origin);
            }
        }
    }

    pub fn callout_origins(&self, callout: RWNodeId) -> &[RWNodeId] {
        self.callout_origins
            .get(&callout)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Exit blocks of a subgraph: the blocks ending in a `Return` node.
    pub fn exit_blocks(&self, subgraph: RWSubgraphId) -> Vec<RWBlockId> {
        self.subgraphs[subgraph.0 as usize]
            .blocks
            .iter()
            .copied()
            .filter(|b| {
                self.blocks[b.0 as usize]
                    .nodes
                    .last()
                    .map(|n| self.nodes[n.0 as usize].ty == RWNodeType::Return)
                    .unwrap_or(false)
            })
            .collect()
    }
}
