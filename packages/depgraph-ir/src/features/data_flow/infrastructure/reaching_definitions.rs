//! Classical iterative reaching-definitions over the read/write graph.
//!
//! The dataflow fact is a `DefinitionsMap`; the transfer function kills
//! covered entries at strong updates and gens the node's def-sites. Block
//! entry states are merged by union and iterated to fixpoint with the
//! classical O(N·D) solver.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::features::read_write::domain::{RWBlockId, RWNode, RWNodeId, ReadWriteGraph};
use crate::shared::adt::QueueFifo;
use crate::shared::offset::{Offset, OffsetInterval};

use super::super::domain::definitions::DefinitionsMap;

#[derive(Debug, Default)]
pub struct ReachingDefinitionsEngine {
    block_in: FxHashMap<RWBlockId, DefinitionsMap>,
    computed: bool,
    /// Fixpoint ceiling; 0 = unlimited.
    pub max_iterations: usize,
}

impl ReachingDefinitionsEngine {
    pub fn new() -> Self {
        ReachingDefinitionsEngine::default()
    }

    /// Apply one node's effect to the fact.
    fn transfer(map: &mut DefinitionsMap, node: &RWNode) {
        for def in &node.defs {
            if def.strong {
                map.kill_covered(def.target, &def.interval);
            }
            map.add(def.target, def.interval, node.id);
        }
    }

    pub fn run(&mut self, graph: &ReadWriteGraph) {
        if self.computed {
            return;
        }

        // seed every block once, then iterate until entry states settle
        let mut worklist: QueueFifo<RWBlockId> = QueueFifo::new();
        let mut queued: FxHashMap<RWBlockId, bool> = FxHashMap::default();
        for block in graph.blocks() {
            worklist.push(block.id);
            queued.insert(block.id, true);
        }

        let mut iterations = 0usize;
        while let Some(bid) = worklist.pop() {
            queued.insert(bid, false);
            iterations += 1;
            if self.max_iterations > 0 && iterations > self.max_iterations {
                debug!(iterations, "reaching definitions: iteration ceiling hit");
                break;
            }

            // out = transfer(in)
            let mut out = self.block_in.get(&bid).cloned().unwrap_or_default();
            for &node in &graph.block(bid).nodes {
                Self::transfer(&mut out, graph.node(node));
            }

            // push into every successor's entry state
            for &succ in &graph.block(bid).successors {
                let entry = self.block_in.entry(succ).or_default();
                if entry.merge(&out) && !queued.get(&succ).copied().unwrap_or(false) {
                    worklist.push(succ);
                    queued.insert(succ, true);
                }
            }
        }

        self.computed = true;
        debug!(iterations, "reaching definitions fixpoint reached");
    }

    /// The fact holding just before `node` executes.
    fn state_before(&self, graph: &ReadWriteGraph, node: RWNodeId) -> DefinitionsMap {
        let Some(bid) = graph.block_of_node(node) else {
            return DefinitionsMap::new();
        };
        let mut map = self.block_in.get(&bid).cloned().unwrap_or_default();
        for &n in &graph.block(bid).nodes {
            if n == node {
                break;
            }
            Self::transfer(&mut map, graph.node(n));
        }
        map
    }

    /// All definitions reaching the use-sites of `use_node`.
    pub fn definitions(&mut self, graph: &ReadWriteGraph, use_node: RWNodeId) -> Vec<RWNodeId> {
        self.run(graph);
        let map = self.state_before(graph, use_node);
        let mut result = Vec::new();
        for site in &graph.node(use_node).uses {
            for def in map.overlapping(site.target, &site.interval) {
                if !result.contains(&def) {
                    result.push(def);
                }
            }
        }
        result
    }

    /// Definitions of `mem[off, off+len)` reaching `at`.
    pub fn definitions_at(
        &mut self,
        graph: &ReadWriteGraph,
        at: RWNodeId,
        mem: RWNodeId,
        off: Offset,
        len: Offset,
    ) -> Vec<RWNodeId> {
        self.run(graph);
        let map = self.state_before(graph, at);
        map.overlapping(mem, &OffsetInterval::new(off, len))
            .into_iter()
            .collect()
    }
}
