//! Flow-sensitive memory model: a memory map (allocation site to memory
//! object) at every program point, joined by union at CFG merges.
//!
//! The state after a node is always recomputed as `effect(join of
//! predecessor states)`, so strong updates stay sound under the monotone
//! growth of the incoming states. With `invalidate` enabled the model
//! additionally retires memory whose lifetime ended (`free`, locals at
//! return), replacing pointers to it with the `INVALIDATED` sentinel.

use rustc_hash::FxHashMap;

use crate::shared::offset::Offset;

use super::super::application::options::PTAOptions;
use super::super::domain::{
    MemoryObject, PGNodeId, Pointer, PointerGraph, PointsToSet, UNKNOWN_MEMORY_ID,
};
use super::builder::BuiltPointerGraph;
use super::solver::{memory_site, preprocess_geps, MemoryModel};

type MemMap = FxHashMap<PGNodeId, MemoryObject>;

#[derive(Debug, Default)]
pub struct FlowSensitiveModel {
    /// State after each node.
    out: FxHashMap<PGNodeId, MemMap>,
    /// Working state of the node currently being processed.
    scratch: Option<(PGNodeId, MemMap)>,
    /// Retire memory whose lifetime ended (the FSInv flavor).
    invalidation: bool,
}

impl FlowSensitiveModel {
    pub fn new(invalidation: bool) -> Self {
        FlowSensitiveModel {
            out: FxHashMap::default(),
            scratch: None,
            invalidation,
        }
    }

    fn scratch_for(&mut self, node: PGNodeId) -> &mut MemMap {
        let owned = matches!(&self.scratch, Some((owner, _)) if *owner == node);
        if !owned {
            // a read outside the node being processed; should not happen,
            // fall back to an empty scratch
            self.scratch = Some((node, MemMap::default()));
        }
        &mut self.scratch.as_mut().expect("scratch just set").1
    }
}

impl MemoryModel for FlowSensitiveModel {
    fn preprocess(&mut self, built: &mut BuiltPointerGraph, options: &PTAOptions) {
        if options.preprocess_geps {
            preprocess_geps(built);
        }
    }

    fn before_processed(&mut self, graph: &PointerGraph, node: PGNodeId) -> bool {
        // state entering the node: join of the predecessors' states
        let mut incoming = MemMap::default();
        for &pred in &graph.node(node).predecessors {
            if let Some(pred_out) = self.out.get(&pred) {
                for (site, mo) in pred_out {
                    incoming
                        .entry(*site)
                        .or_insert_with(|| MemoryObject::new(*site))
                        .merge(mo);
                }
            }
        }
        self.scratch = Some((node, incoming));
        false
    }

    fn after_processed(&mut self, _graph: &PointerGraph, node: PGNodeId) -> bool {
        let Some((owner, map)) = self.scratch.take() else {
            return false;
        };
        debug_assert_eq!(owner, node);
        let changed = self.out.get(&node) != Some(&map);
        if changed {
            self.out.insert(node, map);
        }
        changed
    }

    fn read(&mut self, graph: &PointerGraph, at: PGNodeId, ptr: Pointer) -> PointsToSet {
        if ptr.is_unknown() {
            let mut pts = PointsToSet::new();
            pts.insert(Pointer::unknown());
            return pts;
        }
        let Some(site) = memory_site(graph, ptr.target) else {
            return PointsToSet::new();
        };
        if site == UNKNOWN_MEMORY_ID {
            let mut pts = PointsToSet::new();
            pts.insert(Pointer::unknown());
            return pts;
        }

        let map = self.scratch_for(at);
        let mut result = map
            .get(&site)
            .map(|mo| mo.pointers_at(ptr.offset))
            .unwrap_or_default();

        // zero-initialised memory reads as null until written
        if result.is_empty() {
            let zeroed = graph
                .node(site)
                .alloc
                .map(|a| a.zeroed)
                .unwrap_or(false);
            if zeroed {
                result.insert(Pointer::null());
            }
        }
        result
    }

    fn write(
        &mut self,
        graph: &PointerGraph,
        at: PGNodeId,
        ptr: Pointer,
        values: &PointsToSet,
        singleton: bool,
    ) -> bool {
        let site = if ptr.is_unknown() {
            UNKNOWN_MEMORY_ID
        } else {
            match memory_site(graph, ptr.target) {
                Some(s) => s,
                None => return false,
            }
        };

        // strong update: unambiguous pointer, concrete offset, and the
        // target is a stack or global allocation, never heap
        let is_heap = graph
            .node(site)
            .alloc
            .map(|a| a.is_heap)
            .unwrap_or(site == UNKNOWN_MEMORY_ID);
        let strong = singleton && !ptr.offset.is_unknown() && !is_heap;

        let map = self.scratch_for(at);
        let mo = map.entry(site).or_insert_with(|| MemoryObject::new(site));
        if strong {
            mo.set_pointers(ptr.offset, values.clone());
        } else {
            mo.add_pointers(ptr.offset, values);
        }
        // the state change is reported by after_processed
        false
    }

    fn copy(
        &mut self,
        graph: &PointerGraph,
        at: PGNodeId,
        src: Pointer,
        dst: Pointer,
        len: Offset,
    ) -> bool {
        if len.is_zero() {
            return false;
        }
        let Some(src_site) = memory_site(graph, src.target) else {
            return false;
        };
        let Some(dst_site) = memory_site(graph, dst.target) else {
            return false;
        };

        let map = self.scratch_for(at);
        let mut slices: Vec<(Offset, PointsToSet)> = Vec::new();
        if let Some(src_mo) = map.get(&src_site) {
            for (&off, pts) in src_mo.offsets() {
                if let Some(dst_off) = super::fi::copied_to(src.offset, dst.offset, len, off) {
                    slices.push((dst_off, pts.clone()));
                }
            }
        }

        let dst_mo = map
            .entry(dst_site)
            .or_insert_with(|| MemoryObject::new(dst_site));
        for (off, pts) in slices {
            dst_mo.add_pointers(off, &pts);
        }
        false
    }

    fn on_empty_points_to(
        &mut self,
        graph: &mut PointerGraph,
        _at: PGNodeId,
        operand: PGNodeId,
    ) -> bool {
        // a pointer with no points-to: treat as unknown memory
        graph
            .node_mut(operand)
            .points_to
            .insert(Pointer::unknown())
    }

    fn invalidate(&mut self, graph: &PointerGraph, at: PGNodeId, ptr: Pointer) -> bool {
        if !self.invalidation {
            return false;
        }
        let Some(site) = memory_site(graph, ptr.target) else {
            return false;
        };
        if site == UNKNOWN_MEMORY_ID {
            return false;
        }
        let map = self.scratch_for(at);
        map.remove(&site);
        for mo in map.values_mut() {
            mo.invalidate_target(site);
        }
        false
    }
}
