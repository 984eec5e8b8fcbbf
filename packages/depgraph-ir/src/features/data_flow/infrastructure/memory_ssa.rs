//! Memory-SSA data-dependence engine.
//!
//! Definitions are found lazily: a query scans the use's block backwards
//! (stopping at a strong update that covers the queried bytes), then
//! walks predecessors with memoised per-block results, synthesising an
//! indexed phi node wherever more than one source block reaches. Callee
//! effects enter through the call-out nodes the read/write builder put
//! behind each call; per-function (inputs, outputs) summary records are
//! derivable on demand for the dumpers.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::features::read_write::domain::{
    RWBlockId, RWNodeId, RWNodeType, RWSubgraphId, ReadWriteGraph, UseSite,
};
use crate::shared::offset::{Offset, OffsetInterval};

use super::super::domain::definitions::DefinitionsMap;

type SiteKey = (RWBlockId, RWNodeId, OffsetInterval);

/// Per-function summary: the byte ranges whose definitions the function
/// expects from its callers, and the definitions it exposes to them.
#[derive(Debug, Default)]
pub struct SsaSummary {
    pub inputs: Vec<UseSite>,
    pub outputs: DefinitionsMap,
}

#[derive(Debug, Default)]
pub struct MemorySsaEngine {
    /// Definitions reaching a block's entry for one queried site.
    entry_cache: FxHashMap<SiteKey, FxHashSet<RWNodeId>>,
    in_progress: FxHashSet<SiteKey>,
    /// Synthesised phi nodes, one per (join block, site).
    phis: FxHashMap<SiteKey, RWNodeId>,
}

impl MemorySsaEngine {
    pub fn new() -> Self {
        MemorySsaEngine::default()
    }

    pub fn phi_count(&self) -> usize {
        self.phis.len()
    }

    /// All definitions reaching the use-sites of `use_node`.
    pub fn definitions(
        &mut self,
        graph: &mut ReadWriteGraph,
        use_node: RWNodeId,
    ) -> Vec<RWNodeId> {
        let sites = graph.node(use_node).uses.clone();
        let mut result = Vec::new();
        for site in sites {
            for def in self.definitions_for_site(graph, use_node, site.target, site.interval) {
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
        graph: &mut ReadWriteGraph,
        at: RWNodeId,
        mem: RWNodeId,
        off: Offset,
        len: Offset,
    ) -> Vec<RWNodeId> {
        self.definitions_for_site(graph, at, mem, OffsetInterval::new(off, len))
            .into_iter()
            .collect()
    }

    fn definitions_for_site(
        &mut self,
        graph: &mut ReadWriteGraph,
        at: RWNodeId,
        target: RWNodeId,
        interval: OffsetInterval,
    ) -> FxHashSet<RWNodeId> {
        let Some(block) = graph.block_of_node(at) else {
            return FxHashSet::default();
        };
        let position = graph
            .block(block)
            .nodes
            .iter()
            .position(|n| *n == at)
            .unwrap_or(0);

        let mut found = FxHashSet::default();
        if self.scan_block(graph, block, position, target, &interval, &mut found) {
            return found;
        }
        let (at_entry, _) = self.read_at_entry(graph, block, target, interval);
        found.extend(at_entry);
        found
    }

    /// Scan `block` backwards starting just before `position` (or the
    /// whole block when `position` is its length). Returns true when the
    /// walk hit a covering strong update, i.e. the site is fully
    /// resolved inside the block.
    fn scan_block(
        &mut self,
        graph: &ReadWriteGraph,
        block: RWBlockId,
        position: usize,
        target: RWNodeId,
        interval: &OffsetInterval,
        found: &mut FxHashSet<RWNodeId>,
    ) -> bool {
        let nodes = &graph.block(block).nodes;
        for &candidate in nodes[..position].iter().rev() {
            let node = graph.node(candidate);
            for def in &node.defs {
                if !defines_site(def.target, &def.interval, target, interval) {
                    continue;
                }
                found.insert(candidate);
                if def.strong && def.target == target && def.interval.covers(interval) {
                    // everything older was overwritten
                    return true;
                }
            }
        }
        false
    }

    /// Definitions visible at `block`'s entry for the queried site.
    /// Returns the set plus a flag saying whether the result is clean
    /// (not truncated by an in-progress cycle) and may be cached.
    fn read_at_entry(
        &mut self,
        graph: &mut ReadWriteGraph,
        block: RWBlockId,
        target: RWNodeId,
        interval: OffsetInterval,
    ) -> (FxHashSet<RWNodeId>, bool) {
        let key = (block, target, interval);
        if let Some(cached) = self.entry_cache.get(&key) {
            return (cached.clone(), true);
        }
        if self.in_progress.contains(&key) {
            // a loop back-edge; the cycle head completes the answer
            return (FxHashSet::default(), false);
        }
        self.in_progress.insert(key);

        let preds = graph.block(block).predecessors.clone();
        let mut result = FxHashSet::default();
        let mut clean = true;
        for pred in &preds {
            let len = graph.block(*pred).nodes.len();
            let mut found = FxHashSet::default();
            let stopped = self.scan_block(graph, *pred, len, target, &interval, &mut found);
            result.extend(found);
            if !stopped {
                let (above, above_clean) = self.read_at_entry(graph, *pred, target, interval);
                result.extend(above);
                clean &= above_clean;
            }
        }

        if preds.len() > 1 && !result.is_empty() {
            // a join with definitions flowing in: materialise the phi
            let phi = *self.phis.entry(key).or_insert_with(|| {
                let phi = graph.create_node(RWNodeType::Phi);
                debug!(?key, "memory-ssa: synthesised phi");
                phi
            });
            let merged: Vec<RWNodeId> = result.iter().copied().collect();
            graph.node_mut(phi).defuse = merged;
        }

        self.in_progress.remove(&key);
        if clean {
            self.entry_cache.insert(key, result.clone());
        }
        (result, clean)
    }

    /// The (inputs, outputs) summary of one function: uses that resolve
    /// to nothing inside the function, and definitions reaching its
    /// exits. Computed with a local intraprocedural pass.
    pub fn summary(&mut self, graph: &ReadWriteGraph, subgraph: RWSubgraphId) -> SsaSummary {
        let blocks = graph.subgraph(subgraph).blocks.clone();
        let block_set: FxHashSet<RWBlockId> = blocks.iter().copied().collect();

        // local reaching definitions restricted to the subgraph
        let mut block_in: FxHashMap<RWBlockId, DefinitionsMap> = FxHashMap::default();
        loop {
            let mut changed = false;
            for &bid in &blocks {
                let mut out = block_in.get(&bid).cloned().unwrap_or_default();
                for &node in &graph.block(bid).nodes {
                    for def in &graph.node(node).defs {
                        if def.strong {
                            out.kill_covered(def.target, &def.interval);
                        }
                        out.add(def.target, def.interval, node);
                    }
                }
                for &succ in &graph.block(bid).successors {
                    if !block_set.contains(&succ) {
                        continue;
                    }
                    changed |= block_in.entry(succ).or_default().merge(&out);
                }
            }
            if !changed {
                break;
            }
        }

        let mut summary = SsaSummary::default();

        for &bid in &blocks {
            let mut state = block_in.get(&bid).cloned().unwrap_or_default();
            let nodes = graph.block(bid).nodes.clone();
            for node in nodes {
                for site in &graph.node(node).uses {
                    if state.overlapping(site.target, &site.interval).is_empty() {
                        summary.inputs.push(*site);
                    }
                }
                for def in &graph.node(node).defs {
                    if def.strong {
                        state.kill_covered(def.target, &def.interval);
                    }
                    state.add(def.target, def.interval, node);
                }
            }
            // definitions flowing out of the function
            let is_exit = graph
                .block(bid)
                .nodes
                .last()
                .map(|n| graph.node(*n).ty == RWNodeType::Return)
                .unwrap_or(false);
            if is_exit {
                summary.outputs.merge(&state);
            }
        }

        summary
    }
}

/// Does a def of `def_target[def_interval]` write some byte of
/// `target[interval]`? Unknown memory on either side overlaps anything.
fn defines_site(
    def_target: RWNodeId,
    def_interval: &OffsetInterval,
    target: RWNodeId,
    interval: &OffsetInterval,
) -> bool {
    use crate::features::read_write::domain::RW_UNKNOWN_MEMORY;
    if def_target == RW_UNKNOWN_MEMORY || target == RW_UNKNOWN_MEMORY {
        return true;
    }
    def_target == target && def_interval.overlaps(interval)
}
