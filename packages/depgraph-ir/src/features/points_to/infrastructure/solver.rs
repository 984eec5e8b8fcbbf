//! The fixpoint solver shared by all pointer-analysis flavors.
//!
//! The loop follows the two-tier worklist design: seed with the global
//! nodes and run one round, then seed with the entry function's root and
//! iterate; after every iteration the worklist is re-expanded with all
//! nodes interprocedurally reachable from the ones whose points-to
//! information grew, until nothing changes.
//!
//! Flavors differ only in how memory behaves, which is captured by the
//! `MemoryModel` hooks (`before_processed`, `read`, `write`,
//! `after_processed`, error hooks). Register-level propagation (`Gep`,
//! `Cast`, `Phi`, function-pointer resolution) is identical everywhere.

use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::shared::models::{FunctionId, Module};
use crate::shared::offset::Offset;

use super::super::application::options::PTAOptions;
use super::super::domain::{
    PGNodeId, PGNodeType, Pointer, PointerGraph, PointsToSet, UNKNOWN_MEMORY_ID,
};
use super::builder::{BuiltPointerGraph, PointerGraphBuilder};

/// Fixpoint statistics.
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Worklist re-expansions.
    pub rounds: usize,
    /// Individual node visits.
    pub processed: usize,
    /// The iteration ceiling was hit; the result is sound but imprecise.
    pub reached_limit: bool,
}

/// Memory behavior of one analysis flavor.
pub trait MemoryModel {
    fn preprocess(&mut self, _built: &mut BuiltPointerGraph, _options: &PTAOptions) {}

    /// Called before a node is processed; flow-sensitive models merge the
    /// predecessor states here. Returns whether the node's state changed.
    fn before_processed(&mut self, _graph: &PointerGraph, _node: PGNodeId) -> bool {
        false
    }

    /// Called after a node is processed. Returns whether the node's state
    /// changed.
    fn after_processed(&mut self, _graph: &PointerGraph, _node: PGNodeId) -> bool {
        false
    }

    /// Pointers a read through `ptr` observes at `at`.
    fn read(&mut self, graph: &PointerGraph, at: PGNodeId, ptr: Pointer) -> PointsToSet;

    /// Record a write through `ptr` at `at`. `singleton` says the write
    /// target was unambiguous, which is a precondition of strong updates.
    /// Returns whether memory changed (flow-sensitive models defer the
    /// answer to `after_processed`).
    fn write(
        &mut self,
        graph: &PointerGraph,
        at: PGNodeId,
        ptr: Pointer,
        values: &PointsToSet,
        singleton: bool,
    ) -> bool;

    /// Byte-interval copy between two objects.
    fn copy(
        &mut self,
        graph: &PointerGraph,
        at: PGNodeId,
        src: Pointer,
        dst: Pointer,
        len: Offset,
    ) -> bool;

    /// A pointer was needed but the points-to set is empty. Flow-sensitive
    /// models turn this into unknown memory.
    fn on_empty_points_to(
        &mut self,
        _graph: &mut PointerGraph,
        _at: PGNodeId,
        _operand: PGNodeId,
    ) -> bool {
        false
    }

    /// Lifetime ended for the (unambiguous) target of `ptr`.
    fn invalidate(&mut self, _graph: &PointerGraph, _at: PGNodeId, _ptr: Pointer) -> bool {
        false
    }
}

/// Normalize a pointer target to the allocation site that owns the
/// memory. Pointers are only ever created at allocation sites, so this
/// usually is the identity; casts, geps and address constants unwrap to
/// their base.
pub fn memory_site(graph: &PointerGraph, target: PGNodeId) -> Option<PGNodeId> {
    let mut current = target;
    loop {
        let node = graph.node(current);
        match node.ty {
            PGNodeType::Cast | PGNodeType::Gep => match node.operands.first() {
                Some(&op) => current = op,
                None => return None,
            },
            PGNodeType::Constant => match node.points_to.as_singleton() {
                Some(p) => current = p.target,
                None => return None,
            },
            PGNodeType::Function | PGNodeType::NullAddr | PGNodeType::Invalidated => return None,
            PGNodeType::UnknownMem => return Some(UNKNOWN_MEMORY_ID),
            PGNodeType::Alloc | PGNodeType::DynAlloc | PGNodeType::Global => return Some(current),
            _ => return Some(current),
        }
    }
}

pub struct PointerAnalysisSolver<'a, M: MemoryModel> {
    module: &'a Module,
    options: &'a PTAOptions,
    model: M,
    to_process: Vec<PGNodeId>,
    changed: Vec<PGNodeId>,
    stats: SolverStats,
    reported_incompatible: FxHashSet<(PGNodeId, FunctionId)>,
}

impl<'a, M: MemoryModel> PointerAnalysisSolver<'a, M> {
    pub fn new(module: &'a Module, options: &'a PTAOptions, model: M) -> Self {
        PointerAnalysisSolver {
            module,
            options,
            model,
            to_process: Vec::new(),
            changed: Vec::new(),
            stats: SolverStats::default(),
            reported_incompatible: FxHashSet::default(),
        }
    }

    pub fn run(mut self, built: &mut BuiltPointerGraph) -> SolverStats {
        self.model.preprocess(built, self.options);

        // first tier: the globals and their initializers
        self.to_process = built.graph.globals().to_vec();
        self.iteration(built);
        self.changed.clear();

        // second tier: everything reachable from the entry
        let Some(entry) = built.graph.entry() else {
            warn!("pointer analysis: no entry subgraph, solving globals only");
            return self.stats;
        };
        let root = built.graph.subgraph(entry).root;
        self.to_process = built.graph.nodes_from(&[root]);

        loop {
            self.stats.rounds += 1;
            if !self.iteration(built) {
                break;
            }
            if self.options.max_iterations > 0 && self.stats.rounds >= self.options.max_iterations {
                warn!(
                    rounds = self.stats.rounds,
                    "pointer analysis: iteration ceiling reached, result may be imprecise"
                );
                self.stats.reached_limit = true;
                break;
            }
            let changed = std::mem::take(&mut self.changed);
            self.to_process = built.graph.nodes_from(&changed);
        }

        debug!(
            rounds = self.stats.rounds,
            processed = self.stats.processed,
            "pointer analysis fixpoint reached"
        );
        self.stats
    }

    /// Process every queued node once; record the changed ones. Returns
    /// whether anything changed.
    fn iteration(&mut self, built: &mut BuiltPointerGraph) -> bool {
        let queue = std::mem::take(&mut self.to_process);
        for node in queue {
            self.stats.processed += 1;
            let mut enq = self.model.before_processed(&built.graph, node);
            enq |= self.process_node(built, node);
            enq |= self.model.after_processed(&built.graph, node);
            if enq {
                self.changed.push(node);
            }
        }
        !self.changed.is_empty()
    }

    fn process_node(&mut self, built: &mut BuiltPointerGraph, node: PGNodeId) -> bool {
        match built.graph.node(node).ty {
            PGNodeType::Load => self.process_load(built, node),
            PGNodeType::Store => self.process_store(built, node),
            PGNodeType::Gep => self.process_gep(built, node),
            PGNodeType::Cast
            | PGNodeType::Phi
            | PGNodeType::CallReturn
            | PGNodeType::Return => self.process_copy(built, node),
            PGNodeType::Memcpy => self.process_memcpy(built, node),
            PGNodeType::CallFuncPtr => self.process_funcptr_call(built, node),
            PGNodeType::Fork => self.process_fork(built, node),
            PGNodeType::Join => self.process_join(built, node),
            PGNodeType::Free => self.process_free(built, node),
            PGNodeType::InvalidateLocals | PGNodeType::InvalidateObject => {
                self.process_invalidate(built, node)
            }
            PGNodeType::Call => {
                if built.undefined_calls.contains(&node) {
                    built
                        .graph
                        .node_mut(node)
                        .points_to
                        .insert(Pointer::unknown())
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Union the operands' points-to sets into the node's own set.
    fn process_copy(&mut self, built: &mut BuiltPointerGraph, node: PGNodeId) -> bool {
        let operands = built.graph.node(node).operands.clone();
        let mut acc = PointsToSet::new();
        for op in operands {
            acc.union_with(&built.graph.node(op).points_to);
        }
        built.graph.node_mut(node).points_to.union_with(&acc)
    }

    fn process_gep(&mut self, built: &mut BuiltPointerGraph, node: PGNodeId) -> bool {
        let Some(&base) = built.graph.node(node).operands.first() else {
            return false;
        };
        let gep_offset = built.graph.node(node).offset;
        let base_pts = built.graph.node(base).points_to.clone();

        let mut acc = PointsToSet::new();
        for ptr in base_pts.iter() {
            if ptr.is_unknown() {
                acc.insert(Pointer::unknown());
                continue;
            }
            let mut off = ptr.offset + gep_offset;
            // field-sensitivity cap
            if !off.is_unknown()
                && !self.options.field_sensitivity.is_unknown()
                && off > self.options.field_sensitivity
            {
                off = Offset::UNKNOWN;
            }
            acc.insert(Pointer::new(ptr.target, off));
        }
        built.graph.node_mut(node).points_to.union_with(&acc)
    }

    fn process_load(&mut self, built: &mut BuiltPointerGraph, node: PGNodeId) -> bool {
        let Some(&ptr_op) = built.graph.node(node).operands.first() else {
            return false;
        };
        let ptr_pts = built.graph.node(ptr_op).points_to.clone();

        let mut changed = false;
        if ptr_pts.is_empty() {
            changed |= self.model.on_empty_points_to(&mut built.graph, node, ptr_op);
        }

        let mut acc = PointsToSet::new();
        for ptr in ptr_pts.iter() {
            if ptr.is_null() {
                continue;
            }
            if ptr.is_invalidated() {
                acc.insert(Pointer::invalidated());
                continue;
            }
            acc.union_with(&self.model.read(&built.graph, node, *ptr));
        }
        changed | built.graph.node_mut(node).points_to.union_with(&acc)
    }

    fn process_store(&mut self, built: &mut BuiltPointerGraph, node: PGNodeId) -> bool {
        let ops = built.graph.node(node).operands.clone();
        let (Some(&value_op), Some(&ptr_op)) = (ops.first(), ops.get(1)) else {
            return false;
        };
        let values = built.graph.node(value_op).points_to.clone();
        let ptr_pts = built.graph.node(ptr_op).points_to.clone();

        let mut changed = false;
        if ptr_pts.is_empty() {
            changed |= self.model.on_empty_points_to(&mut built.graph, node, ptr_op);
        }

        let singleton = ptr_pts.len() == 1 && !ptr_pts.has_unknown();
        for ptr in ptr_pts.iter() {
            if ptr.is_null() || ptr.is_invalidated() {
                continue;
            }
            changed |= self
                .model
                .write(&built.graph, node, *ptr, &values, singleton);
        }
        changed
    }

    fn process_memcpy(&mut self, built: &mut BuiltPointerGraph, node: PGNodeId) -> bool {
        let ops = built.graph.node(node).operands.clone();
        let (Some(&dst_op), Some(&src_op)) = (ops.first(), ops.get(1)) else {
            return false;
        };
        let len = built.graph.node(node).offset;
        let dst_pts = built.graph.node(dst_op).points_to.clone();
        let src_pts = built.graph.node(src_op).points_to.clone();

        let mut changed = false;
        for src in src_pts.iter() {
            if src.is_null() || src.is_invalidated() {
                continue;
            }
            for dst in dst_pts.iter() {
                if dst.is_null() || dst.is_unknown() || dst.is_invalidated() {
                    continue;
                }
                changed |= self.model.copy(&built.graph, node, *src, *dst, len);
            }
        }
        // the call returns the destination pointer
        changed | built.graph.node_mut(node).points_to.union_with(&dst_pts)
    }

    /// Function-pointer call: link any newly discovered, prototype
    /// compatible targets into the graph.
    fn process_funcptr_call(&mut self, built: &mut BuiltPointerGraph, node: PGNodeId) -> bool {
        let Some(site) = built.funcptr_sites.get(&node) else {
            return false;
        };
        let callee_op = site.callee_op;
        let args = site.args.clone();
        let arg_tys = site.arg_tys.clone();
        let call_return = site.call_return;

        let pts = built.graph.node(callee_op).points_to.clone();
        let mut changed = false;
        let mut any_target = false;

        for ptr in pts.iter() {
            let Some(fid) = built.graph.node(ptr.target).function else {
                continue;
            };
            let Some(func) = self.module.function(fid) else {
                continue;
            };

            if func.is_declaration() {
                // an undefined target reads and writes wildcard memory;
                // its return value is unknown
                any_target = true;
                changed |= built
                    .graph
                    .node_mut(call_return)
                    .points_to
                    .insert(Pointer::unknown());
                continue;
            }

            if !Module::call_is_compatible(func, &arg_tys) {
                if self.reported_incompatible.insert((node, fid)) {
                    warn!(
                        callee = func.name.as_str(),
                        "incompatible function pointer target, skipping"
                    );
                }
                continue;
            }

            any_target = true;
            let Some(callee_sg) = built.subgraph_of(fid) else {
                continue;
            };
            if built.graph.node(node).callees.contains(&callee_sg) {
                continue;
            }
            PointerGraphBuilder::link_call_into(
                &mut built.graph,
                node,
                call_return,
                callee_sg,
                &args,
            );
            changed = true;
        }

        if pts.has_unknown() || (!pts.is_empty() && !any_target) {
            // no compatible callee at all: an unknown call
            changed |= built
                .graph
                .node_mut(call_return)
                .points_to
                .insert(Pointer::unknown());
        }

        changed
    }

    fn process_fork(&mut self, built: &mut BuiltPointerGraph, node: PGNodeId) -> bool {
        let ops = built.graph.node(node).operands.clone();
        let (Some(&routine_op), data_op) = (ops.first(), ops.get(1).copied()) else {
            return false;
        };

        let pts = built.graph.node(routine_op).points_to.clone();
        let mut changed = false;
        for ptr in pts.iter() {
            let Some(fid) = built.graph.node(ptr.target).function else {
                continue;
            };
            let Some(callee_sg) = built.subgraph_of(fid) else {
                continue;
            };
            if built.graph.node(node).callees.contains(&callee_sg) {
                continue;
            }
            let (root, params) = {
                let sg = built.graph.subgraph(callee_sg);
                (sg.root, sg.params.clone())
            };
            if let (Some(param), Some(data)) = (params.first(), data_op) {
                built.graph.add_operand(*param, data);
            }
            built.graph.add_successor(node, root);
            built.graph.node_mut(node).callees.push(callee_sg);
            built.graph.subgraph_mut(callee_sg).callers.push(node);
            changed = true;
        }
        changed
    }

    /// `pthread_join(th, retp)` writes some spawned thread's return value
    /// through `retp`. Which fork matches is left to the thread-region
    /// analysis; here every forked function's return may flow in.
    fn process_join(&mut self, built: &mut BuiltPointerGraph, node: PGNodeId) -> bool {
        let Some(&retp_op) = built.graph.node(node).operands.first() else {
            return false;
        };
        let retp_pts = built.graph.node(retp_op).points_to.clone();
        if retp_pts.is_empty() {
            return false;
        }

        let mut returned = PointsToSet::new();
        for &fork in &built.fork_nodes {
            for &sg in &built.graph.node(fork).callees {
                let ret = built.graph.subgraph(sg).ret;
                returned.union_with(&built.graph.node(ret).points_to);
            }
        }
        if returned.is_empty() {
            return false;
        }

        let singleton = retp_pts.len() == 1 && !retp_pts.has_unknown();
        let mut changed = false;
        for ptr in retp_pts.iter() {
            if ptr.is_null() || ptr.is_invalidated() {
                continue;
            }
            changed |= self
                .model
                .write(&built.graph, node, *ptr, &returned, singleton);
        }
        changed
    }

    fn process_free(&mut self, built: &mut BuiltPointerGraph, node: PGNodeId) -> bool {
        let Some(&ptr_op) = built.graph.node(node).operands.first() else {
            return false;
        };
        let pts = built.graph.node(ptr_op).points_to.clone();
        if pts.len() != 1 || pts.has_unknown() {
            // ambiguous free cannot invalidate anything
            return false;
        }
        let ptr = pts.as_singleton().expect("checked singleton");
        self.model.invalidate(&built.graph, node, ptr)
    }

    fn process_invalidate(&mut self, built: &mut BuiltPointerGraph, node: PGNodeId) -> bool {
        let operands = built.graph.node(node).operands.clone();
        let mut changed = false;
        for alloc in operands {
            changed |= self.model.invalidate(
                &built.graph,
                node,
                Pointer::new(alloc, Offset::ZERO),
            );
        }
        changed
    }
}

/// Force GEPs sitting in CFG loops whose result is stored and reloaded
/// within the same loop to the unknown offset; in a flow-insensitive
/// analysis they would end up there after some iterations anyway.
pub fn preprocess_geps(built: &mut BuiltPointerGraph) {
    let mut force_unknown = Vec::new();

    for sg in 0..built.graph.subgraphs().len() {
        let sg_id = built.graph.subgraphs()[sg].id;
        for scc in built.graph.subgraph_loops(sg_id) {
            let members: FxHashSet<PGNodeId> = scc.iter().copied().collect();
            let has_load = scc
                .iter()
                .any(|n| built.graph.node(*n).ty == PGNodeType::Load);
            if !has_load {
                continue;
            }
            for &gep in scc
                .iter()
                .filter(|n| built.graph.node(**n).ty == PGNodeType::Gep)
            {
                if flows_into_store(&built.graph, gep, &members) {
                    force_unknown.push(gep);
                }
            }
        }
    }

    for gep in force_unknown {
        built.graph.node_mut(gep).offset = Offset::UNKNOWN;
    }
}

/// Does `start`'s value flow (through operand edges within `scope`) into
/// a store inside `scope`?
fn flows_into_store(
    graph: &PointerGraph,
    start: PGNodeId,
    scope: &FxHashSet<PGNodeId>,
) -> bool {
    let mut reached = FxHashSet::default();
    reached.insert(start);

    loop {
        let mut grew = false;
        for &member in scope {
            if reached.contains(&member) {
                continue;
            }
            if graph
                .node(member)
                .operands
                .iter()
                .any(|op| reached.contains(op))
            {
                if graph.node(member).ty == PGNodeType::Store {
                    return true;
                }
                reached.insert(member);
                grew = true;
            }
        }
        if !grew {
            return false;
        }
    }
}
