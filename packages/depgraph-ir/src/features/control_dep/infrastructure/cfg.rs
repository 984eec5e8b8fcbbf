//! Block-level CFG of one function, in petgraph form, with a virtual
//! exit node unifying every return and unreachable so post-dominance is
//! well defined.

use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

use crate::shared::models::{BlockId, Function, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfgNode {
    Block(BlockId),
    /// Virtual exit every terminating block is wired to.
    Exit,
}

#[derive(Debug)]
pub struct FunctionCfg {
    pub graph: DiGraph<CfgNode, ()>,
    pub entry: NodeIndex,
    pub exit: NodeIndex,
    pub block_index: FxHashMap<BlockId, NodeIndex>,
}

impl FunctionCfg {
    pub fn new(func: &Function) -> Self {
        let mut graph = DiGraph::new();
        let mut block_index = FxHashMap::default();

        for block in &func.blocks {
            let idx = graph.add_node(CfgNode::Block(block.id));
            block_index.insert(block.id, idx);
        }
        let exit = graph.add_node(CfgNode::Exit);

        for block in &func.blocks {
            let from = block_index[&block.id];
            let succs = block.successors();
            if succs.is_empty() {
                // return, unreachable, or an unterminated block
                graph.add_edge(from, exit, ());
            } else {
                for succ in succs {
                    graph.add_edge(from, block_index[&succ], ());
                }
            }
            // a terminator that both branches and may leave the function
            // does not exist in this IR; rets never have successors
            debug_assert!(
                !matches!(
                    block.terminator().map(|t| &t.op),
                    Some(Opcode::Ret { .. }) | Some(Opcode::Unreachable)
                ) || block.successors().is_empty()
            );
        }

        let entry = block_index[&func.blocks[0].id];
        FunctionCfg {
            graph,
            entry,
            exit,
            block_index,
        }
    }

    pub fn block_of(&self, idx: NodeIndex) -> Option<BlockId> {
        match self.graph[idx] {
            CfgNode::Block(b) => Some(b),
            CfgNode::Exit => None,
        }
    }

    /// Branch points: nodes with at least two successors.
    pub fn branches(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&n| self.graph.neighbors(n).count() >= 2)
            .collect()
    }
}
