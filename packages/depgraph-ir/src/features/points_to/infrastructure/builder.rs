//! Translation of an IR module into the pointer graph.
//!
//! The builder walks every defined function twice: the first pass creates
//! one node per instruction (address-producing instructions get their
//! typed node, everything else a `Noop` so the CFG chain stays gapless),
//! the second pass wires operands, call edges and the CFG. Function
//! pointer calls are left unresolved as `CallFuncPtr` sites; the solver
//! links their targets as the points-to sets grow.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::shared::models::{
    Function, FunctionId, Instruction, Module, ModuleIndex, Opcode, Type, Value, ValueId,
};
use crate::shared::offset::Offset;

use super::super::application::options::{AllocationKind, PTAOptions};
use super::super::domain::{
    AllocAttrs, PGNodeId, PGNodeType, PGSubgraphId, Pointer, PointerGraph, NULL_ID,
};

/// A call through a function pointer, kept aside until the solver learns
/// what the pointer may target.
#[derive(Debug)]
pub struct FuncPtrSite {
    pub callee_op: PGNodeId,
    pub args: Vec<PGNodeId>,
    pub arg_tys: Vec<Type>,
    pub call_return: PGNodeId,
}

/// The pointer graph plus the side tables the solvers need.
#[derive(Debug)]
pub struct BuiltPointerGraph {
    pub graph: PointerGraph,
    pub subgraph_of_fn: FxHashMap<FunctionId, PGSubgraphId>,
    pub funcptr_sites: FxHashMap<PGNodeId, FuncPtrSite>,
    pub fork_nodes: Vec<PGNodeId>,
    /// Calls to functions without a body and without a model; their
    /// results point to unknown memory.
    pub undefined_calls: FxHashSet<PGNodeId>,
}

impl BuiltPointerGraph {
    pub fn subgraph_of(&self, function: FunctionId) -> Option<PGSubgraphId> {
        self.subgraph_of_fn.get(&function).copied()
    }
}

pub struct PointerGraphBuilder<'m> {
    module: &'m Module,
    index: &'m ModuleIndex<'m>,
    options: &'m PTAOptions,
    graph: PointerGraph,
    subgraph_of_fn: FxHashMap<FunctionId, PGSubgraphId>,
    funcptr_sites: FxHashMap<PGNodeId, FuncPtrSite>,
    fork_nodes: Vec<PGNodeId>,
    undefined_calls: FxHashSet<PGNodeId>,
    /// First and last node of each built block, for CFG wiring.
    block_bounds: FxHashMap<crate::shared::models::BlockId, (PGNodeId, PGNodeId)>,
    /// Call instruction -> its Call/CallFuncPtr node. The value mapping
    /// points at the CallReturn node (the call's result), so the call
    /// node itself is kept here.
    call_sites: FxHashMap<ValueId, PGNodeId>,
}

impl<'m> PointerGraphBuilder<'m> {
    pub fn new(module: &'m Module, index: &'m ModuleIndex<'m>, options: &'m PTAOptions) -> Self {
        PointerGraphBuilder {
            module,
            index,
            options,
            graph: PointerGraph::new(),
            subgraph_of_fn: FxHashMap::default(),
            funcptr_sites: FxHashMap::default(),
            fork_nodes: Vec::new(),
            undefined_calls: FxHashSet::default(),
            block_bounds: FxHashMap::default(),
            call_sites: FxHashMap::default(),
        }
    }

    pub fn build(mut self) -> BuiltPointerGraph {
        self.build_globals();

        // subgraph skeletons first, so call edges can link forward
        for func in &self.module.functions {
            if !func.is_declaration() {
                let sg = self.graph.create_subgraph(func.id);
                self.subgraph_of_fn.insert(func.id, sg);
            }
        }

        for func in &self.module.functions {
            if !func.is_declaration() {
                self.build_function(func);
            }
        }

        if let Some(&entry) = self
            .module
            .function_by_name(&self.options.entry_function)
            .and_then(|f| self.subgraph_of_fn.get(&f.id))
        {
            self.graph.set_entry(entry);

            // chain the global sequence in front of the entry so the
            // flow-sensitive solvers see the initializers' effects
            let globals = self.graph.globals().to_vec();
            let mut prev: Option<PGNodeId> = None;
            for g in globals {
                if let Some(p) = prev {
                    self.graph.add_successor(p, g);
                }
                prev = Some(g);
            }
            if let Some(last) = prev {
                let root = self.graph.subgraph(entry).root;
                self.graph.add_successor(last, root);
            }
        }

        BuiltPointerGraph {
            graph: self.graph,
            subgraph_of_fn: self.subgraph_of_fn,
            funcptr_sites: self.funcptr_sites,
            fork_nodes: self.fork_nodes,
            undefined_calls: self.undefined_calls,
        }
    }

    fn build_globals(&mut self) {
        for global in &self.module.globals {
            let node = self.graph.create_node(PGNodeType::Global);
            self.graph.node_mut(node).alloc = Some(AllocAttrs {
                size: Offset::new(global.size),
                is_heap: false,
                zeroed: true,
            });
            let self_ptr = Pointer::new(node, Offset::ZERO);
            self.graph.node_mut(node).points_to.insert(self_ptr);
            self.graph.map_value(Value::Global(global.id), node);
            self.graph.add_global(node);
        }

        // initializers become stores in the global sequence, processed
        // before any function
        let inits: Vec<(Value, Vec<Value>)> = self
            .module
            .globals
            .iter()
            .filter(|g| !g.initializer_points_to.is_empty())
            .map(|g| (Value::Global(g.id), g.initializer_points_to.clone()))
            .collect();
        for (gval, targets) in inits {
            let gnode = self.graph.node_of(gval).expect("global node just built");
            for target in targets {
                let tnode = self.operand_node(target);
                let store = self.graph.create_node(PGNodeType::Store);
                self.graph.add_operand(store, tnode);
                self.graph.add_operand(store, gnode);
                self.graph.add_global(store);
            }
        }
    }

    fn build_function(&mut self, func: &'m Function) {
        let sg = self.subgraph_of_fn[&func.id];
        let root = self.graph.subgraph(sg).root;

        // formal parameters gather actual arguments like phi nodes
        let mut prev = root;
        for param in &func.params {
            let phi = self.graph.create_node_in(PGNodeType::Phi, sg);
            self.graph.map_value(Value::Instr(param.id), phi);
            self.graph.subgraph_mut(sg).params.push(phi);
            self.graph.add_successor(prev, phi);
            prev = phi;
        }

        // pass 1: one node (sequence) per instruction, chained in order
        let mut allocas = Vec::new();
        let entry_block = func.blocks[0].id;
        for block in &func.blocks {
            let mut first: Option<PGNodeId> = None;
            let mut last: Option<PGNodeId> = None;
            for instr in &block.instructions {
                for node in self.create_instruction_nodes(sg, instr) {
                    match last {
                        Some(l) => self.graph.add_successor(l, node),
                        None => first = Some(node),
                    }
                    last = Some(node);
                    if self.graph.node(node).ty == PGNodeType::Alloc {
                        allocas.push(node);
                    }
                }
            }
            let first = first.expect("blocks are never empty");
            let last = last.expect("blocks are never empty");
            if block.id == entry_block {
                self.graph.add_successor(prev, first);
            }
            self.block_bounds.insert(block.id, (first, last));
        }

        // pass 2: operands and call linkage
        for block in &func.blocks {
            for instr in &block.instructions {
                self.wire_instruction(func, sg, instr);
            }
        }

        // CFG edges between blocks; returns run into the unified Return
        let ret_node = self.graph.subgraph(sg).ret;
        for block in &func.blocks {
            let (_, last) = self.block_bounds[&block.id];
            for succ in block.successors() {
                let (succ_first, _) = self.block_bounds[&succ];
                self.graph.add_successor(last, succ_first);
            }
            if matches!(
                block.terminator().map(|t| &t.op),
                Some(Opcode::Ret { .. })
            ) {
                if self.options.flavor.invalidates() {
                    let inval = self.graph.create_node_in(PGNodeType::InvalidateLocals, sg);
                    for &a in &allocas {
                        self.graph.add_operand(inval, a);
                    }
                    self.graph.add_successor(last, inval);
                    self.graph.add_successor(inval, ret_node);
                } else {
                    self.graph.add_successor(last, ret_node);
                }
            }
        }
    }

    /// Create the node(s) for one instruction and map the instruction's
    /// result value onto the node that carries it.
    fn create_instruction_nodes(&mut self, sg: PGSubgraphId, instr: &Instruction) -> Vec<PGNodeId> {
        let value = Value::Instr(instr.id);
        match &instr.op {
            Opcode::Alloca { elem_size, count } => {
                let node = self.graph.create_node_in(PGNodeType::Alloc, sg);
                let size = match count {
                    None => Offset::new(*elem_size),
                    Some(Value::ConstInt(c)) if *c >= 0 => {
                        Offset::new(*elem_size) * Offset::new(*c as u64)
                    }
                    Some(_) => Offset::UNKNOWN,
                };
                self.graph.node_mut(node).alloc = Some(AllocAttrs {
                    size,
                    is_heap: false,
                    zeroed: false,
                });
                let self_ptr = Pointer::new(node, Offset::ZERO);
                self.graph.node_mut(node).points_to.insert(self_ptr);
                self.graph.map_value(value, node);
                vec![node]
            }
            Opcode::Store { .. } => {
                let node = self.graph.create_node_in(PGNodeType::Store, sg);
                self.graph.map_value(value, node);
                vec![node]
            }
            Opcode::Load { .. } => {
                let node = self.graph.create_node_in(PGNodeType::Load, sg);
                self.graph.map_value(value, node);
                vec![node]
            }
            Opcode::Gep { offset, .. } => {
                let node = self.graph.create_node_in(PGNodeType::Gep, sg);
                self.graph.node_mut(node).offset =
                    offset.map(Offset::new).unwrap_or(Offset::UNKNOWN);
                self.graph.map_value(value, node);
                vec![node]
            }
            Opcode::Cast { .. } => {
                let node = self.graph.create_node_in(PGNodeType::Cast, sg);
                self.graph.map_value(value, node);
                vec![node]
            }
            Opcode::Phi { .. } => {
                let node = self.graph.create_node_in(PGNodeType::Phi, sg);
                self.graph.map_value(value, node);
                vec![node]
            }
            Opcode::Call { callee, args, .. } => self.create_call_nodes(sg, instr, *callee, args),
            _ => {
                let node = self.graph.create_node_in(PGNodeType::Noop, sg);
                self.graph.map_value(value, node);
                vec![node]
            }
        }
    }

    fn create_call_nodes(
        &mut self,
        sg: PGSubgraphId,
        instr: &Instruction,
        callee: Value,
        args: &[Value],
    ) -> Vec<PGNodeId> {
        let value = Value::Instr(instr.id);

        if let Some(callee_fn) = self.index.direct_callee(callee) {
            let name = callee_fn.name.as_str();

            if let Some(kind) = self.options.allocation_kind(name) {
                return self.create_dyn_alloc(sg, value, kind, args);
            }
            if name == "free" {
                let node = self.graph.create_node_in(PGNodeType::Free, sg);
                self.graph.map_value(value, node);
                return vec![node];
            }
            if is_memcpy_name(name) {
                let node = self.graph.create_node_in(PGNodeType::Memcpy, sg);
                let len = args
                    .get(2)
                    .and_then(|v| v.const_int())
                    .filter(|c| *c >= 0)
                    .map(|c| Offset::new(c as u64))
                    .unwrap_or(Offset::UNKNOWN);
                self.graph.node_mut(node).offset = len;
                self.graph.map_value(value, node);
                return vec![node];
            }
            if name == "memset" {
                // zeroing writes null pointers over the destination
                let node = self.graph.create_node_in(PGNodeType::Store, sg);
                self.graph.map_value(value, node);
                return vec![node];
            }
            if self.options.threads && name == "pthread_create" {
                let node = self.graph.create_node_in(PGNodeType::Fork, sg);
                self.graph.map_value(value, node);
                self.fork_nodes.push(node);
                return vec![node];
            }
            if self.options.threads && name == "pthread_join" {
                let node = self.graph.create_node_in(PGNodeType::Join, sg);
                self.graph.map_value(value, node);
                return vec![node];
            }
            if self.options.threads && name == "pthread_exit" {
                let node = self.graph.create_node_in(PGNodeType::Noop, sg);
                self.graph.map_value(value, node);
                return vec![node];
            }

            if callee_fn.is_declaration() {
                let node = self.graph.create_node_in(PGNodeType::Call, sg);
                self.graph.map_value(value, node);
                self.undefined_calls.insert(node);
                return vec![node];
            }

            // a defined callee: call node plus call-return node; the
            // callee subgraph sits between them in the CFG
            let call = self.graph.create_node_in(PGNodeType::Call, sg);
            let call_ret = self.graph.create_node_in(PGNodeType::CallReturn, sg);
            self.call_sites.insert(instr.id, call);
            // the call's result is what the callee returns
            self.graph.map_value(value, call_ret);
            vec![call, call_ret]
        } else {
            // call through a pointer; targets resolved by the solver
            let call = self.graph.create_node_in(PGNodeType::CallFuncPtr, sg);
            let call_ret = self.graph.create_node_in(PGNodeType::CallReturn, sg);
            self.call_sites.insert(instr.id, call);
            self.graph.map_value(value, call_ret);
            vec![call, call_ret]
        }
    }

    fn create_dyn_alloc(
        &mut self,
        sg: PGSubgraphId,
        value: Value,
        kind: AllocationKind,
        args: &[Value],
    ) -> Vec<PGNodeId> {
        let node = self.graph.create_node_in(PGNodeType::DynAlloc, sg);

        let const_arg = |i: usize| {
            args.get(i)
                .and_then(|v| v.const_int())
                .filter(|c| *c >= 0)
                .map(|c| Offset::new(c as u64))
                .unwrap_or(Offset::UNKNOWN)
        };

        let (size, zeroed, is_heap) = match kind {
            AllocationKind::Malloc => (const_arg(0), false, true),
            AllocationKind::Calloc => (const_arg(0) * const_arg(1), true, true),
            AllocationKind::Alloca => (const_arg(0), false, false),
            AllocationKind::Realloc => (const_arg(1), false, true),
        };

        self.graph.node_mut(node).alloc = Some(AllocAttrs {
            size,
            is_heap,
            zeroed,
        });
        let self_ptr = Pointer::new(node, Offset::ZERO);
        self.graph.node_mut(node).points_to.insert(self_ptr);
        self.graph.map_value(value, node);

        if kind == AllocationKind::Realloc {
            // realloc carries the old contents over
            let copy = self.graph.create_node_in(PGNodeType::Memcpy, sg);
            self.graph.node_mut(copy).offset = Offset::UNKNOWN;
            return vec![node, copy];
        }

        vec![node]
    }

    fn wire_instruction(&mut self, func: &'m Function, sg: PGSubgraphId, instr: &Instruction) {
        let value = Value::Instr(instr.id);
        let node = match self
            .call_sites
            .get(&instr.id)
            .copied()
            .or_else(|| self.graph.node_of(value))
        {
            Some(n) => n,
            None => return,
        };

        match &instr.op {
            Opcode::Store {
                value: stored,
                ptr,
                ..
            } => {
                let v = self.operand_node(*stored);
                let p = self.operand_node(*ptr);
                self.graph.add_operand(node, v);
                self.graph.add_operand(node, p);
            }
            Opcode::Load { ptr, .. } => {
                let p = self.operand_node(*ptr);
                self.graph.add_operand(node, p);
            }
            Opcode::Gep { ptr, .. } => {
                let p = self.operand_node(*ptr);
                self.graph.add_operand(node, p);
            }
            Opcode::Cast { value: v, .. } => {
                let op = self.operand_node(*v);
                self.graph.add_operand(node, op);
            }
            Opcode::Phi { incoming, .. } => {
                for (v, _) in incoming {
                    let op = self.operand_node(*v);
                    self.graph.add_operand(node, op);
                }
            }
            Opcode::Ret { value: Some(v) } => {
                let op = self.operand_node(*v);
                let ret = self.graph.subgraph(sg).ret;
                self.graph.add_operand(ret, op);
            }
            Opcode::Call { callee, args, .. } => {
                self.wire_call(func, sg, instr, *callee, args, node);
            }
            _ => {}
        }
    }

    fn wire_call(
        &mut self,
        _func: &'m Function,
        _sg: PGSubgraphId,
        instr: &Instruction,
        callee: Value,
        args: &[Value],
        node: PGNodeId,
    ) {
        match self.graph.node(node).ty {
            PGNodeType::DynAlloc => {
                // realloc's copy node follows the allocation in the chain
                if let (Some(copy), Some(old_arg)) = (self.realloc_copy_node(node), args.first()) {
                    let old = self.operand_node(*old_arg);
                    self.graph.add_operand(copy, node);
                    self.graph.add_operand(copy, old);
                }
            }
            PGNodeType::Free => {
                if let Some(arg) = args.first() {
                    let op = self.operand_node(*arg);
                    self.graph.add_operand(node, op);
                }
            }
            PGNodeType::Memcpy => {
                // operands: destination, source
                if args.len() >= 2 {
                    let dst = self.operand_node(args[0]);
                    let src = self.operand_node(args[1]);
                    self.graph.add_operand(node, dst);
                    self.graph.add_operand(node, src);
                }
            }
            PGNodeType::Store => {
                // memset: null pointers over the destination
                if let Some(dst) = args.first() {
                    let d = self.operand_node(*dst);
                    self.graph.add_operand(node, NULL_ID);
                    self.graph.add_operand(node, d);
                }
            }
            PGNodeType::Fork => {
                if args.len() >= 4 {
                    let routine = self.operand_node(args[2]);
                    let data = self.operand_node(args[3]);
                    self.graph.add_operand(node, routine);
                    self.graph.add_operand(node, data);
                }
            }
            PGNodeType::Join => {
                if args.len() >= 2 {
                    let retval = self.operand_node(args[1]);
                    self.graph.add_operand(node, retval);
                }
            }
            PGNodeType::Call => {
                if self.undefined_calls.contains(&node) {
                    return;
                }
                let callee_fn = self
                    .index
                    .direct_callee(callee)
                    .expect("defined direct call");
                let Some(&callee_sg) = self.subgraph_of_fn.get(&callee_fn.id) else {
                    return;
                };
                let arg_nodes: Vec<PGNodeId> =
                    args.iter().map(|a| self.operand_node(*a)).collect();
                let call_ret = self
                    .graph
                    .node_of(Value::Instr(instr.id))
                    .expect("call-return mapped");
                self.link_call(node, call_ret, callee_sg, &arg_nodes);
            }
            PGNodeType::CallFuncPtr => {
                let callee_op = self.operand_node(callee);
                self.graph.add_operand(node, callee_op);
                let arg_nodes: Vec<PGNodeId> =
                    args.iter().map(|a| self.operand_node(*a)).collect();
                let call_ret = self
                    .graph
                    .node_of(Value::Instr(instr.id))
                    .expect("call-return mapped");
                self.funcptr_sites.insert(
                    node,
                    FuncPtrSite {
                        callee_op,
                        args: arg_nodes,
                        arg_tys: self.index.arg_types(args),
                        call_return: call_ret,
                    },
                );
            }
            _ => {}
        }
    }

    /// Wire a resolved call: arguments into the callee's parameter phis,
    /// the procedure-call CFG edge and the return edge.
    pub fn link_call_into(
        graph: &mut PointerGraph,
        call: PGNodeId,
        call_ret: PGNodeId,
        callee_sg: PGSubgraphId,
        args: &[PGNodeId],
    ) {
        let (root, ret, params) = {
            let sg = graph.subgraph(callee_sg);
            (sg.root, sg.ret, sg.params.clone())
        };

        for (param, arg) in params.iter().zip(args.iter()) {
            graph.add_operand(*param, *arg);
        }

        graph.add_successor(call, root);
        graph.add_successor(ret, call_ret);
        graph.add_operand(call_ret, ret);
        graph.node_mut(call).callees.push(callee_sg);
        graph.subgraph_mut(callee_sg).callers.push(call);
    }

    fn link_call(
        &mut self,
        call: PGNodeId,
        call_ret: PGNodeId,
        callee_sg: PGSubgraphId,
        args: &[PGNodeId],
    ) {
        Self::link_call_into(&mut self.graph, call, call_ret, callee_sg, args);
    }

    /// The `Memcpy` node that models realloc's carry-over copy, if `node`
    /// was built for a realloc call.
    fn realloc_copy_node(&self, node: PGNodeId) -> Option<PGNodeId> {
        let succs = &self.graph.node(node).successors;
        succs
            .iter()
            .copied()
            .find(|s| self.graph.node(*s).ty == PGNodeType::Memcpy && self.graph.node(*s).operands.is_empty())
    }

    fn operand_node(&mut self, value: Value) -> PGNodeId {
        if let Some(node) = self.graph.node_of(value) {
            return node;
        }
        match value {
            Value::Function(fid) => {
                let node = self.graph.create_node(PGNodeType::Function);
                self.graph.node_mut(node).function = Some(fid);
                let self_ptr = Pointer::new(node, Offset::ZERO);
                self.graph.node_mut(node).points_to.insert(self_ptr);
                self.graph.map_value(value, node);
                node
            }
            Value::Null => NULL_ID,
            Value::Global(_) => {
                // globals are all pre-built; an unknown id is a malformed
                // module, fall back to a constant node
                warn!("operand references an unknown global: {:?}", value);
                let node = self.graph.create_node(PGNodeType::Constant);
                self.graph.map_value(value, node);
                node
            }
            Value::ConstInt(_) | Value::Undef => {
                let node = self.graph.create_node(PGNodeType::Constant);
                self.graph.map_value(value, node);
                node
            }
            Value::Instr(_) => {
                // an operand that never got a node (cross-block phi input
                // from a value-less instruction); treat as a constant
                let node = self.graph.create_node(PGNodeType::Constant);
                self.graph.map_value(value, node);
                node
            }
        }
    }
}

fn is_memcpy_name(name: &str) -> bool {
    name == "memcpy"
        || name == "memmove"
        || name == "__memcpy_chk"
        || name.starts_with("llvm.memcpy")
        || name.starts_with("llvm.memmove")
}
