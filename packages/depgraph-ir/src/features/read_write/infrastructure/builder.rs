//! Translation of an IR module into the read/write graph, using the
//! pointer analysis to map pointer operands onto def- and use-sites.
//!
//! Calls into defined functions leave a `CallOut` node behind the call:
//! it carries the callee's summary outputs (definitions reaching the
//! callee's exits) instantiated for the call site, with writes through
//! parameters substituted by the actual argument's points-to set. The
//! summaries are fixpointed bottom-up over the call graph, so nested and
//! recursive calls stay sound.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::features::data_flow::application::options::DDAOptions;
use crate::features::data_flow::domain::definitions::DefinitionsMap;
use crate::features::points_to::application::options::AllocationKind;
use crate::features::points_to::ports::PointsToQuery;
use crate::shared::adt::SetQueue;
use crate::shared::models::{
    Block, BlockId, Function, FunctionId, Instruction, Module, ModuleIndex, Opcode, Value,
};
use crate::shared::offset::{Offset, OffsetInterval};

use super::super::domain::{
    DefSite, RWBlockId, RWNodeId, RWNodeType, RWSubgraphId, ReadWriteGraph, UseSite,
    RW_UNKNOWN_MEMORY,
};
use super::models::FunctionModel;

/// The read/write graph plus the value mappings the dependence-graph
/// assembly needs.
#[derive(Debug)]
pub struct BuiltReadWriteGraph {
    pub graph: ReadWriteGraph,
    pub subgraph_of_fn: FxHashMap<FunctionId, RWSubgraphId>,
}

impl BuiltReadWriteGraph {
    pub fn subgraph_of(&self, function: FunctionId) -> Option<RWSubgraphId> {
        self.subgraph_of_fn.get(&function).copied()
    }
}

struct CalloutSite {
    callout: RWNodeId,
    callee: FunctionId,
    args: Vec<Value>,
}

pub struct ReadWriteGraphBuilder<'m, P: PointsToQuery> {
    module: &'m Module,
    index: &'m ModuleIndex<'m>,
    pta: &'m P,
    options: &'m DDAOptions,
    graph: ReadWriteGraph,
    subgraph_of_fn: FxHashMap<FunctionId, RWSubgraphId>,
    callout_sites: Vec<CalloutSite>,
    address_taken: FxHashSet<Value>,
    /// Log-once guard for pointers whose target has no node.
    warned_unmapped: FxHashSet<Value>,
}

impl<'m, P: PointsToQuery> ReadWriteGraphBuilder<'m, P> {
    pub fn new(
        module: &'m Module,
        index: &'m ModuleIndex<'m>,
        pta: &'m P,
        options: &'m DDAOptions,
    ) -> Self {
        ReadWriteGraphBuilder {
            module,
            index,
            pta,
            options,
            graph: ReadWriteGraph::new(),
            subgraph_of_fn: FxHashMap::default(),
            callout_sites: Vec::new(),
            address_taken: FxHashSet::default(),
            warned_unmapped: FxHashSet::default(),
        }
    }

    pub fn build(mut self, entry_function: &str) -> BuiltReadWriteGraph {
        self.collect_address_taken();
        self.build_globals();

        for func in &self.module.functions {
            if !func.is_declaration() {
                let sg = self.graph.create_subgraph(func.id);
                self.subgraph_of_fn.insert(func.id, sg);
            }
        }
        // allocation sites first: any function's def/use sites may
        // target another function's stack or heap objects
        self.precreate_allocation_nodes();
        for func in &self.module.functions {
            if !func.is_declaration() {
                self.build_function(func);
            }
        }

        // every callee is built: fixpoint the call-site summaries
        self.compute_callout_definitions();

        if let Some(&entry) = self
            .module
            .function_by_name(entry_function)
            .and_then(|f| self.subgraph_of_fn.get(&f.id))
        {
            self.graph.set_entry(entry);
        }

        BuiltReadWriteGraph {
            graph: self.graph,
            subgraph_of_fn: self.subgraph_of_fn,
        }
    }

    /// An allocation's address is taken when the value is stored into
    /// memory or escapes as a call argument.
    fn collect_address_taken(&mut self) {
        for func in &self.module.functions {
            for block in &func.blocks {
                for instr in &block.instructions {
                    match &instr.op {
                        Opcode::Store { value, .. } => {
                            self.address_taken.insert(*value);
                        }
                        Opcode::Call { args, .. } => {
                            for arg in args {
                                self.address_taken.insert(*arg);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn build_globals(&mut self) {
        for global in &self.module.globals {
            let node = self.graph.create_node(RWNodeType::Global);
            self.graph.node_mut(node).size = Offset::new(global.size);
            self.graph.map_value(Value::Global(global.id), node);
            self.graph.add_global(node);
        }
    }

    /// Create the `Alloc`/`DynAlloc` nodes of every function up front so
    /// cross-function def/use sites always find their target.
    fn precreate_allocation_nodes(&mut self) {
        for func in &self.module.functions {
            let Some(&sg) = self.subgraph_of_fn.get(&func.id) else {
                continue;
            };
            for block in &func.blocks {
                for instr in &block.instructions {
                    let value = Value::Instr(instr.id);
                    match &instr.op {
                        Opcode::Alloca { elem_size, count } => {
                            let node = self.graph.create_node(RWNodeType::Alloc);
                            let size = match count {
                                None => Offset::new(*elem_size),
                                Some(Value::ConstInt(c)) if *c >= 0 => {
                                    Offset::new(*elem_size) * Offset::new(*c as u64)
                                }
                                Some(_) => Offset::UNKNOWN,
                            };
                            self.graph.node_mut(node).size = size;
                            if self.address_taken.contains(&value) {
                                self.graph.node_mut(node).address_taken = true;
                            }
                            self.graph.subgraph_mut(sg).allocations.push(node);
                            self.graph.map_value(value, node);
                        }
                        Opcode::Call { callee, args, .. } => {
                            let Some(direct) = self.index.direct_callee(*callee) else {
                                continue;
                            };
                            let Some(kind) = allocation_kind_of(&direct.name) else {
                                continue;
                            };
                            let node = self.graph.create_node(RWNodeType::DynAlloc);
                            self.graph.node_mut(node).is_heap =
                                kind != AllocationKind::Alloca;
                            let const_arg = |i: usize| {
                                args.get(i)
                                    .and_then(|v| v.const_int())
                                    .filter(|c| *c >= 0)
                                    .map(|c| Offset::new(c as u64))
                                    .unwrap_or(Offset::UNKNOWN)
                            };
                            let size = match kind {
                                AllocationKind::Calloc => const_arg(0) * const_arg(1),
                                AllocationKind::Realloc => const_arg(1),
                                _ => const_arg(0),
                            };
                            self.graph.node_mut(node).size = size;
                            if self.address_taken.contains(&value) {
                                self.graph.node_mut(node).address_taken = true;
                            }
                            self.graph.subgraph_mut(sg).allocations.push(node);
                            self.graph.map_value(value, node);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn build_function(&mut self, func: &'m Function) {
        let sg = self.subgraph_of_fn[&func.id];

        // block bounds for CFG wiring: IR block -> (first, last) rw block
        let mut bounds: FxHashMap<BlockId, (RWBlockId, RWBlockId)> = FxHashMap::default();

        // BFS over the blocks from the entry, so operands are built
        // before their uses on any forward path
        let mut queue: SetQueue<BlockId> = SetQueue::new();
        let entry_id = func.blocks[0].id;
        queue.push(entry_id);
        let mut order: Vec<&Block> = Vec::new();
        while let Some(bid) = queue.pop() {
            let block = func.block(bid).expect("successor of a known block");
            order.push(block);
            for succ in block.successors() {
                queue.push(succ);
            }
        }
        // unreachable blocks still need nodes; append them last
        for block in &func.blocks {
            if !queue.was_queued(&block.id) {
                order.push(block);
            }
        }

        for block in order {
            let (first, last) = self.build_block(func, sg, block);
            bounds.insert(block.id, (first, last));
        }

        for block in &func.blocks {
            let (_, last) = bounds[&block.id];
            for succ in block.successors() {
                let (succ_first, _) = bounds[&succ];
                self.graph.add_block_edge(last, succ_first);
            }
        }

        self.graph.subgraph_mut(sg).entry = Some(bounds[&entry_id].0);
    }

    /// Build the rw block of one IR block. A call into defined functions
    /// gets a `CallOut` node right behind it, carrying the callee's
    /// instantiated summary once the fixpoint has run.
    fn build_block(
        &mut self,
        func: &'m Function,
        sg: RWSubgraphId,
        block: &'m Block,
    ) -> (RWBlockId, RWBlockId) {
        let rw_block = self.graph.create_block(sg);

        for instr in &block.instructions {
            let (node, callees) = self.build_instruction(func, sg, instr);
            let Some(node) = node else { continue };
            self.graph.append_node(rw_block, node);
            self.graph.map_value(Value::Instr(instr.id), node);

            let is_fork = self.graph.node(node).ty == RWNodeType::Fork;
            for &callee in &callees {
                self.graph.add_caller(callee, node);
            }
            if !callees.is_empty() && !is_fork {
                // the call's memory effects surface here
                let callout = self.graph.create_node(RWNodeType::CallOut);
                self.graph.append_node(rw_block, callout);
                self.graph.node_mut(callout).value = Some(Value::Instr(instr.id));
                let args = match &instr.op {
                    Opcode::Call { args, .. } => args.clone(),
                    _ => Vec::new(),
                };
                for callee in callees {
                    self.callout_sites.push(CalloutSite {
                        callout,
                        callee,
                        args: args.clone(),
                    });
                }
            }
        }

        (rw_block, rw_block)
    }

    /// Returns the node for the instruction (if it touches memory or the
    /// CFG) and the defined functions it calls into.
    fn build_instruction(
        &mut self,
        func: &'m Function,
        sg: RWSubgraphId,
        instr: &'m Instruction,
    ) -> (Option<RWNodeId>, Vec<FunctionId>) {
        match &instr.op {
            Opcode::Alloca { .. } => {
                let node = self
                    .graph
                    .node_of(Value::Instr(instr.id))
                    .expect("allocation nodes are pre-created");
                (Some(node), Vec::new())
            }
            Opcode::Store { ptr, size, .. } => {
                let node = self.graph.create_node(RWNodeType::Store);
                let sites =
                    self.map_pointers(instr, *ptr, Offset::new(*size));

                // strong update only for an unambiguous write to a stack
                // or global allocation with concrete offset and length
                let strong = match sites.as_slice() {
                    [site] => {
                        let target = self.graph.node(site.target);
                        (target.ty == RWNodeType::Alloc || target.ty == RWNodeType::Global)
                            && !target.is_heap
                            && (self.options.strong_update_unknown || !site.interval.is_unknown())
                    }
                    _ => false,
                };
                for site in sites {
                    self.graph.node_mut(node).add_def_site(DefSite {
                        strong,
                        ..site
                    });
                }
                (Some(node), Vec::new())
            }
            Opcode::Load { ptr, ty } => {
                let node = self.graph.create_node(RWNodeType::Load);
                let size = match ty.byte_size() {
                    0 => Offset::UNKNOWN,
                    s => Offset::new(s),
                };
                let sites = self.map_pointers(instr, *ptr, size);
                for site in sites {
                    self.graph
                        .node_mut(node)
                        .add_use_site(UseSite {
                            target: site.target,
                            interval: site.interval,
                        });
                }
                (Some(node), Vec::new())
            }
            Opcode::Ret { .. } => {
                let node = self.graph.create_node(RWNodeType::Return);
                if self.options.forget_locals_at_return {
                    let allocs = self.graph.subgraph(sg).allocations.clone();
                    for alloc in allocs {
                        let size = self.graph.node(alloc).size;
                        let strong = !size.is_unknown();
                        self.graph
                            .node_mut(node)
                            .add_def(alloc, Offset::ZERO, size, strong);
                    }
                }
                (Some(node), Vec::new())
            }
            Opcode::Call { callee, args, .. } => self.build_call(func, instr, *callee, args),
            _ => (None, Vec::new()),
        }
    }

    fn build_call(
        &mut self,
        _func: &'m Function,
        instr: &'m Instruction,
        callee: Value,
        args: &'m [Value],
    ) -> (Option<RWNodeId>, Vec<FunctionId>) {
        if let Some(callee_fn) = self.index.direct_callee(callee) {
            return self.build_call_to(instr, callee_fn, args, std::slice::from_ref(&callee_fn.id));
        }

        // call via pointer: ask the pointer analysis
        let targets = self.pta.functions_pointed_by(callee);
        let compatible: Vec<&Function> = targets
            .iter()
            .filter_map(|fid| self.module.function(*fid))
            .filter(|f| Module::call_is_compatible(f, &self.index.arg_types(args)))
            .collect();

        if compatible.is_empty() {
            warn!(
                "could not determine the called function in a call via pointer (instr {:?})",
                instr.id
            );
            return (Some(self.build_unknown_call(instr, args)), Vec::new());
        }

        // one call node covering every compatible target
        let mut defined = Vec::new();
        let mut node: Option<RWNodeId> = None;
        for target in &compatible {
            let (n, mut d) = self.build_call_to(instr, target, args, &[target.id]);
            defined.append(&mut d);
            // merge sites into one node
            match (node, n) {
                (None, n) => node = n,
                (Some(acc), Some(extra)) if acc != extra => {
                    let (defs, uses) = {
                        let e = self.graph.node(extra);
                        (e.defs.clone(), e.uses.clone())
                    };
                    for d in defs {
                        self.graph.node_mut(acc).add_def_site(d);
                    }
                    for u in uses {
                        self.graph.node_mut(acc).add_use_site(u);
                    }
                }
                _ => {}
            }
        }
        (node.or_else(|| Some(self.graph.create_node(RWNodeType::Call))), defined)
    }

    fn build_call_to(
        &mut self,
        instr: &'m Instruction,
        callee: &Function,
        args: &'m [Value],
        _ids: &[FunctionId],
    ) -> (Option<RWNodeId>, Vec<FunctionId>) {
        let name = callee.name.as_str();

        if let Some(model) = self.model_for(name) {
            return (Some(self.build_modelled_call(instr, &model, args)), Vec::new());
        }

        if let Some(kind) = allocation_kind_of(name) {
            return match kind {
                AllocationKind::Realloc => (Some(self.build_realloc(instr, args)), Vec::new()),
                _ => (Some(self.build_dyn_alloc(instr, kind, args)), Vec::new()),
            };
        }

        if name == "llvm.va_start" || name == "va_start" {
            // works like an allocation the varargs are spilled into
            let node = self.graph.create_node(RWNodeType::Call);
            self.graph
                .node_mut(node)
                .add_def(node, Offset::ZERO, Offset::UNKNOWN, false);
            return (Some(node), Vec::new());
        }

        if self.options.threads {
            match name {
                "pthread_create" => return self.build_fork(instr, args),
                "pthread_join" => return (Some(self.build_join(instr, args)), Vec::new()),
                "pthread_exit" => {
                    return (Some(self.graph.create_node(RWNodeType::Return)), Vec::new())
                }
                _ => {}
            }
        }

        if callee.is_declaration() {
            return (Some(self.build_unknown_call(instr, args)), Vec::new());
        }

        // a defined callee: the memory effects happen inside its own
        // subgraph, spliced in by the caller's block split
        let node = self.graph.create_node(RWNodeType::Call);
        if let Some(&callee_sg) = self.subgraph_of_fn.get(&callee.id) {
            self.graph.node_mut(node).callees.push(callee_sg);
        }
        (Some(node), vec![callee.id])
    }

    fn model_for(&self, name: &str) -> Option<FunctionModel> {
        if let Some(m) = self.options.function_model(name) {
            return Some(m.clone());
        }
        // intrinsic name families share one model
        if name.starts_with("llvm.memcpy") || name.starts_with("llvm.memmove") {
            return self.options.function_model("memcpy").cloned();
        }
        if name.starts_with("llvm.memset") {
            return self.options.function_model("memset").cloned();
        }
        None
    }

    fn build_modelled_call(
        &mut self,
        instr: &'m Instruction,
        model: &FunctionModel,
        args: &'m [Value],
    ) -> RWNodeId {
        let node = self.graph.create_node(RWNodeType::Call);

        for (i, arg) in args.iter().enumerate() {
            if !model.handles(i) {
                continue;
            }
            let Some(pts) = self.pta.points_to(*arg) else {
                warn!(
                    func = model.name.as_str(),
                    operand = i,
                    "no points-to set for modelled function operand"
                );
                continue;
            };

            let singleton = pts.pointers.len() == 1 && !pts.has_unknown;
            let mut sites: Vec<(RWNodeId, Offset)> = Vec::new();
            for ptr in &pts.pointers {
                if matches!(ptr.value, Value::Function(_)) {
                    continue;
                }
                sites.push((self.target_node(ptr.value), ptr.offset));
            }
            if pts.has_unknown {
                sites.push((RW_UNKNOWN_MEMORY, Offset::UNKNOWN));
            }

            for (target, base) in sites {
                if let Some(defines) = model.defines(i) {
                    let from = base + defines.from.resolve(args);
                    let to = base + defines.to.resolve(args);
                    let len = to - from;
                    let strong = singleton
                        && !from.is_unknown()
                        && !to.is_unknown()
                        && self.graph.node(target).is_allocation()
                        && !self.graph.node(target).is_heap;
                    self.graph.node_mut(node).add_def(target, from, len, strong);
                }
                if let Some(uses) = model.uses(i) {
                    let from = base + uses.from.resolve(args);
                    let to = base + uses.to.resolve(args);
                    self.graph.node_mut(node).add_use(target, from, to - from);
                }
            }
        }

        let _ = instr;
        node
    }

    fn build_dyn_alloc(
        &mut self,
        instr: &'m Instruction,
        kind: AllocationKind,
        _args: &'m [Value],
    ) -> RWNodeId {
        let node = self
            .graph
            .node_of(Value::Instr(instr.id))
            .expect("allocation nodes are pre-created");

        if kind == AllocationKind::Calloc {
            // calloc hands out defined (zeroed) memory
            let size = self.graph.node(node).size;
            self.graph
                .node_mut(node)
                .add_def(node, Offset::ZERO, size, false);
        }
        node
    }

    fn build_realloc(&mut self, instr: &'m Instruction, args: &'m [Value]) -> RWNodeId {
        let node = self.build_dyn_alloc(instr, AllocationKind::Realloc, args);
        let size = self.graph.node(node).size;

        // realloc defines itself: it carries the old contents over
        self.graph
            .node_mut(node)
            .add_def(node, Offset::ZERO, size, false);
        if let Some(old) = args.first() {
            let sites = self.map_pointers(instr, *old, size);
            for site in sites {
                self.graph.node_mut(node).add_use_site(UseSite {
                    target: site.target,
                    interval: site.interval,
                });
            }
        }
        node
    }

    fn build_fork(
        &mut self,
        instr: &'m Instruction,
        args: &'m [Value],
    ) -> (Option<RWNodeId>, Vec<FunctionId>) {
        let node = self.graph.create_node(RWNodeType::Fork);

        // the thread handle is written through the first argument
        if let Some(handle) = args.first() {
            let sites = self.map_pointers(instr, *handle, Offset::UNKNOWN);
            for site in sites {
                self.graph.node_mut(node).add_def_site(DefSite {
                    strong: false,
                    ..site
                });
            }
        }

        let mut spawned = Vec::new();
        if let Some(routine) = args.get(2) {
            for fid in self.pta.functions_pointed_by(*routine) {
                if let Some(f) = self.module.function(fid) {
                    if !f.is_declaration() {
                        if let Some(&sg) = self.subgraph_of_fn.get(&fid) {
                            self.graph.node_mut(node).callees.push(sg);
                        }
                        spawned.push(fid);
                    } else {
                        warn!(
                            routine = f.name.as_str(),
                            "pthread_create spawns an undefined function"
                        );
                    }
                }
            }
        }
        (Some(node), spawned)
    }

    fn build_join(&mut self, instr: &'m Instruction, args: &'m [Value]) -> RWNodeId {
        let node = self.graph.create_node(RWNodeType::Join);
        // the thread's result is written through the second argument; the
        // rest is an over-approximating unknown call
        if let Some(retp) = args.get(1) {
            let sites = self.map_pointers(instr, *retp, Offset::UNKNOWN);
            for site in sites {
                self.graph.node_mut(node).add_def_site(DefSite {
                    strong: false,
                    ..site
                });
            }
        }
        node
    }

    fn build_unknown_call(&mut self, instr: &'m Instruction, args: &'m [Value]) -> RWNodeId {
        let node = self.graph.create_node(RWNodeType::Call);
        let behavior = self.options.undefined_funs;

        if behavior.pure {
            return node;
        }
        if behavior.write_any {
            self.graph
                .node_mut(node)
                .add_def(RW_UNKNOWN_MEMORY, Offset::UNKNOWN, Offset::UNKNOWN, false);
        }
        if behavior.read_any {
            self.graph
                .node_mut(node)
                .add_use(RW_UNKNOWN_MEMORY, Offset::UNKNOWN, Offset::UNKNOWN);
        }
        if !behavior.read_args && !behavior.write_args {
            return node;
        }

        // every pointer passed into the undefined call may be read and
        // redefined by it
        for arg in args {
            // constants other than writable globals cannot be redefined
            if let Value::Global(gid) = arg {
                if self
                    .module
                    .global(*gid)
                    .map(|g| g.is_constant)
                    .unwrap_or(false)
                {
                    continue;
                }
            } else if matches!(arg, Value::ConstInt(_) | Value::Null | Value::Undef) {
                continue;
            }

            let Some(pts) = self.pta.points_to(*arg) else {
                continue;
            };
            for ptr in &pts.pointers {
                if matches!(ptr.value, Value::Function(_)) {
                    continue;
                }
                let target = self.target_node(ptr.value);
                if behavior.write_args {
                    self.graph.node_mut(node).add_def(
                        target,
                        Offset::UNKNOWN,
                        Offset::UNKNOWN,
                        false,
                    );
                }
                if behavior.read_args {
                    self.graph
                        .node_mut(node)
                        .add_use(target, Offset::UNKNOWN, Offset::UNKNOWN);
                }
            }
            if pts.has_unknown {
                if behavior.write_args {
                    self.graph.node_mut(node).add_def(
                        RW_UNKNOWN_MEMORY,
                        Offset::UNKNOWN,
                        Offset::UNKNOWN,
                        false,
                    );
                }
                if behavior.read_args {
                    self.graph.node_mut(node).add_use(
                        RW_UNKNOWN_MEMORY,
                        Offset::UNKNOWN,
                        Offset::UNKNOWN,
                    );
                }
            }
        }

        let _ = instr;
        node
    }

    /// Map a pointer operand to the sites it may address, `size` bytes
    /// wide. Unknown pointers and unmapped targets land on the
    /// unknown-memory sentinel.
    fn map_pointers(
        &mut self,
        instr: &'m Instruction,
        ptr: Value,
        size: Offset,
    ) -> Vec<DefSite> {
        let mut sites = Vec::new();

        let Some(pts) = self.pta.points_to(ptr) else {
            // a pointer we know nothing about
            sites.push(DefSite::new(
                RW_UNKNOWN_MEMORY,
                Offset::UNKNOWN,
                Offset::UNKNOWN,
                false,
            ));
            return sites;
        };

        // points-to sets beyond the cap collapse to unknown memory
        if !self.options.max_set_size.is_unknown()
            && Offset::new(pts.pointers.len() as u64) > self.options.max_set_size
        {
            sites.push(DefSite::new(
                RW_UNKNOWN_MEMORY,
                Offset::UNKNOWN,
                Offset::UNKNOWN,
                false,
            ));
            return sites;
        }

        for ptr in &pts.pointers {
            if matches!(ptr.value, Value::Function(_)) {
                continue;
            }
            let target = self.target_node(ptr.value);
            if ptr.offset.is_unknown() {
                sites.push(DefSite::new(target, Offset::UNKNOWN, Offset::UNKNOWN, false));
            } else {
                sites.push(DefSite::new(target, ptr.offset, size, false));
            }
        }
        if pts.has_unknown {
            sites.push(DefSite::new(
                RW_UNKNOWN_MEMORY,
                Offset::UNKNOWN,
                Offset::UNKNOWN,
                false,
            ));
        }
        if sites.is_empty() {
            // null-only or empty: reads through it see nothing; record
            // unknown so the engines stay sound
            sites.push(DefSite::new(
                RW_UNKNOWN_MEMORY,
                Offset::UNKNOWN,
                Offset::UNKNOWN,
                false,
            ));
        }

        let _ = instr;
        sites
    }

    /// Fixpoint over the call-site summaries: every `CallOut` receives
    /// the callee's exit-reaching definitions, instantiated for its call
    /// site. Sites only ever grow, so the loop terminates.
    fn compute_callout_definitions(&mut self) {
        loop {
            let mut changed = false;

            for i in 0..self.callout_sites.len() {
                let callout = self.callout_sites[i].callout;
                let callee = self.callout_sites[i].callee;
                let args = self.callout_sites[i].args.clone();
                let Some(&callee_sg) = self.subgraph_of_fn.get(&callee) else {
                    continue;
                };

                let summary = self.exit_definitions(callee_sg);
                for (target, entries) in summary.targets() {
                    // the callee's own stack dies at return and leaks no
                    // definitions
                    let tnode = self.graph.node(*target);
                    if tnode.ty == RWNodeType::Alloc
                        && tnode.block.and_then(|b| self.graph.block(b).subgraph)
                            == Some(callee_sg)
                    {
                        continue;
                    }

                    for entry in entries {
                        let origins: Vec<RWNodeId> = entry.defs.iter().copied().collect();
                        for (new_target, interval) in
                            self.instantiate(callee, &args, *target, entry.interval)
                        {
                            let site = DefSite {
                                target: new_target,
                                interval,
                                // call effects never update strongly
                                strong: false,
                            };
                            if !self.graph.node(callout).defs.contains(&site) {
                                self.graph.node_mut(callout).add_def_site(site);
                                changed = true;
                            }
                        }
                        self.graph.add_callout_origins(callout, origins.iter().copied());
                    }
                }
            }

            if !changed {
                break;
            }
        }
    }

    /// Definitions reaching the exits of one subgraph: a local iterative
    /// pass over its blocks (which already contain the callouts of
    /// nested calls).
    fn exit_definitions(&self, sg: RWSubgraphId) -> DefinitionsMap {
        let blocks = self.graph.subgraph(sg).blocks.clone();
        let mut block_in: FxHashMap<RWBlockId, DefinitionsMap> = FxHashMap::default();

        loop {
            let mut changed = false;
            for &bid in &blocks {
                let mut out = block_in.get(&bid).cloned().unwrap_or_default();
                for &node in &self.graph.block(bid).nodes {
                    for def in &self.graph.node(node).defs {
                        if def.strong {
                            out.kill_covered(def.target, &def.interval);
                        }
                        out.add(def.target, def.interval, node);
                    }
                }
                for &succ in &self.graph.block(bid).successors {
                    changed |= block_in.entry(succ).or_default().merge(&out);
                }
            }
            if !changed {
                break;
            }
        }

        let mut result = DefinitionsMap::new();
        for exit in self.graph.exit_blocks(sg) {
            let mut out = block_in.get(&exit).cloned().unwrap_or_default();
            for &node in &self.graph.block(exit).nodes {
                for def in &self.graph.node(node).defs {
                    if def.strong {
                        out.kill_covered(def.target, &def.interval);
                    }
                    out.add(def.target, def.interval, node);
                }
            }
            result.merge(&out);
        }
        result
    }

    /// Rewrite a summary definition for one call site: a write through a
    /// parameter becomes a write to whatever the actual argument points
    /// to; everything else passes through unchanged.
    fn instantiate(
        &mut self,
        callee: FunctionId,
        args: &[Value],
        target: RWNodeId,
        interval: OffsetInterval,
    ) -> Vec<(RWNodeId, OffsetInterval)> {
        let Some(callee_fn) = self.module.function(callee) else {
            return vec![(target, interval)];
        };

        let mut out = Vec::new();
        let mut matched = false;
        for (i, param) in callee_fn.params.iter().enumerate() {
            let Some(ppts) = self.pta.points_to(Value::Instr(param.id)) else {
                continue;
            };
            let hits = ppts
                .pointers
                .iter()
                .any(|rp| self.graph.node_of(rp.value) == Some(target))
                || (ppts.has_unknown && target == RW_UNKNOWN_MEMORY);
            if !hits {
                continue;
            }
            matched = true;

            let Some(arg) = args.get(i) else { continue };
            let Some(apts) = self.pta.points_to(*arg) else {
                continue;
            };
            for rp in &apts.pointers {
                if matches!(rp.value, Value::Function(_)) {
                    continue;
                }
                let node = self.target_node(rp.value);
                let start = rp.offset + interval.start;
                out.push((
                    node,
                    OffsetInterval::new(start, interval.len),
                ));
            }
            if apts.has_unknown {
                out.push((
                    RW_UNKNOWN_MEMORY,
                    OffsetInterval::whole(),
                ));
            }
        }

        if !matched {
            out.push((target, interval));
        }
        out
    }

    /// The rw node of a pointed-to value; unmapped targets are reported
    /// once and become unknown memory.
    fn target_node(&mut self, value: Value) -> RWNodeId {
        match self.graph.node_of(value) {
            Some(n) => n,
            None => {
                if self.warned_unmapped.insert(value) {
                    warn!(?value, "no read/write node for points-to target");
                }
                RW_UNKNOWN_MEMORY
            }
        }
    }

}

fn allocation_kind_of(name: &str) -> Option<AllocationKind> {
    match name {
        "malloc" => Some(AllocationKind::Malloc),
        "calloc" => Some(AllocationKind::Calloc),
        "realloc" => Some(AllocationKind::Realloc),
        "alloca" | "__builtin_alloca" => Some(AllocationKind::Alloca),
        _ => None,
    }
}
