//! Assembly of the system dependence graph.
//!
//! Every IR instruction is mirrored by one node, globals by shared
//! nodes; call sites get actual parameter nodes and a link to the
//! callee's graph with its formal parameters. Data edges come from the
//! data-dependence engine, control edges from the control-dependence
//! analysis plus the interprocedural no-return machinery, interference
//! and fork/join edges from the thread regions.
//!
//! Edge direction is flow direction: an edge `a -> b` means b depends on
//! a, so a backward slice walks incoming edges.

use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::features::control_dep::application::analysis::ControlDependenceAnalysis;
use crate::features::data_flow::ports::DefUseQuery;
use crate::features::points_to::ports::PointsToQuery;
use crate::features::threads::ports::ThreadRegions;
use crate::shared::adt::QueueLifo;
use crate::shared::models::{
    Function, FunctionId, Instruction, Module, ModuleIndex, Opcode, Value, ValueId,
};
use crate::shared::offset::Offset;

use super::super::domain::{
    DepKind, FunctionSdg, SDGBlockId, SDGNodeId, SDGNodeKind, Sdg, ARTIFICIAL_LABEL,
};

pub struct SdgBuilder<'a, P: PointsToQuery> {
    module: &'a Module,
    index: &'a ModuleIndex<'a>,
    pta: &'a P,
    sdg: Sdg,
    build_queue: Vec<FunctionId>,
    reported_incompatible: FxHashSet<(ValueId, FunctionId)>,
}

impl<'a, P: PointsToQuery> SdgBuilder<'a, P> {
    pub fn new(module: &'a Module, index: &'a ModuleIndex<'a>, pta: &'a P) -> Self {
        SdgBuilder {
            module,
            index,
            pta,
            sdg: Sdg::new(),
            build_queue: Vec::new(),
            reported_incompatible: FxHashSet::default(),
        }
    }

    /// Build the full graph with all edges.
    pub fn build<D: DefUseQuery, T: ThreadRegions>(
        mut self,
        dda: &mut D,
        cd: &ControlDependenceAnalysis,
        threads: Option<&T>,
        entry: FunctionId,
    ) -> Sdg {
        // shared global nodes first
        for global in &self.module.globals {
            self.sdg.add_global(global.id);
        }
        self.sdg.entry_function = Some(entry);

        // build reachable functions, entry first
        self.queue_function(entry);
        while let Some(fid) = self.build_queue.pop() {
            if !self.sdg.is_built(fid) {
                self.build_function(fid);
            }
        }

        self.propagate_global_parameters();
        self.add_def_use_edges(dda);
        self.add_control_dependencies(cd);
        self.add_noreturn_dependencies(cd);

        if let Some(regions) = threads {
            self.add_interference_edges(regions);
            self.add_fork_join_edges(regions);
            self.add_critical_sections(regions);
        }

        debug!(
            nodes = self.sdg.node_count(),
            functions = self.sdg.function_ids().len(),
            "system dependence graph assembled"
        );
        self.sdg
    }

    fn queue_function(&mut self, fid: FunctionId) {
        if !self.sdg.is_built(fid) && !self.build_queue.contains(&fid) {
            self.build_queue.push(fid);
        }
    }

    fn build_function(&mut self, fid: FunctionId) {
        let Some(func) = self.module.function(fid) else {
            return;
        };
        if func.is_declaration() {
            return;
        }

        let entry_node = self.sdg.create_node(SDGNodeKind::Entry(fid));
        let exit_node = self.sdg.create_node(SDGNodeKind::UnifiedExit(fid));
        let exit_block = self.sdg.create_block(fid, None);
        self.sdg.append_node(exit_block, exit_node);

        let mut fsdg = FunctionSdg {
            function: fid,
            entry_node,
            exit_node: Some(exit_node),
            entry_block: None,
            exit_block: Some(exit_block),
            blocks: vec![exit_block],
            params: Default::default(),
            callers: Vec::new(),
        };

        // formal parameters for the arguments; the parameter's value id
        // resolves to the formal-in node in operand position
        for param in &func.params {
            let value = Value::Instr(param.id);
            let fin = self.sdg.create_node(SDGNodeKind::FormalIn(fid, value));
            let fout = self.sdg.create_node(SDGNodeKind::FormalOut(fid, value));
            self.sdg.add_edge(entry_node, fin, DepKind::Control);
            self.sdg.add_edge(entry_node, fout, DepKind::Control);
            fsdg.params.formal.insert(value, (fin, fout));
            self.sdg.map_param(param.id, fin);
        }

        self.sdg.insert_function(fsdg);

        // mirror the blocks
        let mut block_ids: Vec<(crate::shared::models::BlockId, SDGBlockId)> = Vec::new();
        for block in &func.blocks {
            let sblock = self.sdg.create_block(fid, Some(block.id));
            block_ids.push((block.id, sblock));
            let mut prev: Option<SDGNodeId> = None;
            for instr in &block.instructions {
                let node = self.sdg.create_node(SDGNodeKind::Instruction(instr.id));
                self.sdg.node_mut(node).function = Some(fid);
                self.sdg.append_node(sblock, node);
                self.handle_instruction(func, instr, node, prev);
                prev = Some(node);
            }
            self.sdg
                .function_mut(fid)
                .expect("just inserted")
                .blocks
                .push(sblock);
        }

        // labelled CFG edges
        for block in &func.blocks {
            let from = block_ids
                .iter()
                .find(|(b, _)| *b == block.id)
                .map(|(_, s)| *s)
                .expect("block mirrored");
            for (label, succ) in block.successors().into_iter().enumerate() {
                if label >= usize::from(ARTIFICIAL_LABEL) {
                    warn!("too many successors, dropping edge");
                    break;
                }
                let to = block_ids
                    .iter()
                    .find(|(b, _)| *b == succ)
                    .map(|(_, s)| *s)
                    .expect("successor mirrored");
                self.sdg.add_block_edge(from, to, label as u8);
            }
            // returns run into the unified exit
            if matches!(
                block.terminator().map(|t| &t.op),
                Some(Opcode::Ret { .. })
            ) {
                self.sdg.add_block_edge(from, exit_block, ARTIFICIAL_LABEL);
                let ret_node = self
                    .sdg
                    .block(from)
                    .last_node()
                    .expect("terminated block has nodes");
                self.sdg.add_edge(ret_node, exit_node, DepKind::Control);
            }
        }

        let entry_block = block_ids.first().map(|(_, s)| *s);
        if let Some(eb) = entry_block {
            let fsdg = self.sdg.function_mut(fid).expect("inserted");
            fsdg.entry_block = Some(eb);
            // the first instruction hangs off the entry node
            if let Some(first) = self.sdg.block(eb).first_node() {
                self.sdg.add_edge(entry_node, first, DepKind::Control);
            }
        }

        // conservative control deps onto phis, so the (possibly empty)
        // predecessor blocks a phi chooses by must stay alive
        for block in &func.blocks {
            for instr in &block.instructions {
                if let Opcode::Phi { incoming, .. } = &instr.op {
                    let phi_node = self.sdg.node_of_instr(instr.id).expect("mirrored");
                    for (_, pred) in incoming {
                        if *pred == block.id {
                            continue;
                        }
                        let pred_sblock = block_ids
                            .iter()
                            .find(|(b, _)| *b == *pred)
                            .map(|(_, s)| *s);
                        if let Some(ps) = pred_sblock {
                            if let Some(term) = self.sdg.block(ps).last_node() {
                                self.sdg.add_edge(term, phi_node, DepKind::Control);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Instruction-specific wiring during the mirror pass: call linkage
    /// and formal globals.
    fn handle_instruction(
        &mut self,
        func: &Function,
        instr: &Instruction,
        node: SDGNodeId,
        _prev: Option<SDGNodeId>,
    ) {
        match &instr.op {
            Opcode::Call { callee, args, .. } => {
                self.handle_call(func, instr, node, *callee, args);
            }
            Opcode::Load { ptr, .. } | Opcode::Gep { ptr, .. } => {
                if let Value::Global(_) = ptr {
                    self.add_formal_global(func.id, *ptr);
                }
            }
            Opcode::Store { value, ptr, .. } => {
                if let Value::Global(_) = value {
                    self.add_formal_global(func.id, *value);
                }
                if let Value::Global(_) = ptr {
                    self.add_formal_global(func.id, *ptr);
                }
            }
            _ => {}
        }
    }

    fn handle_call(
        &mut self,
        func: &Function,
        instr: &Instruction,
        node: SDGNodeId,
        callee: Value,
        args: &[Value],
    ) {
        let mut targets: Vec<(FunctionId, bool)> = Vec::new();

        if let Some(direct) = self.index.direct_callee(callee) {
            let name = direct.name.clone();
            if !direct.is_declaration() {
                targets.push((direct.id, false));
            }
            // heap allocations escape like globals: expose the call as a
            // formal parameter so defs through it can travel the chain
            if matches!(name.as_str(), "malloc" | "calloc" | "realloc") {
                self.add_formal_parameter(func.id, Value::Instr(instr.id));
            }
            if name == "pthread_create" {
                if let Some(routine) = args.get(2) {
                    for fid in self.resolve_routine(*routine) {
                        targets.push((fid, true));
                    }
                }
            }
        } else {
            // a call through a pointer: the points-to set names the
            // possible callees, filtered by prototype compatibility
            let arg_tys = self.index.arg_types(args);
            for fid in self.pta.functions_pointed_by(callee) {
                let Some(f) = self.module.function(fid) else {
                    continue;
                };
                if f.is_declaration() {
                    continue;
                }
                if !Module::call_is_compatible(f, &arg_tys) {
                    if self.reported_incompatible.insert((instr.id, fid)) {
                        warn!(
                            callee = f.name.as_str(),
                            "function pointer target with incompatible prototype, skipping"
                        );
                    }
                    continue;
                }
                targets.push((fid, false));
            }
        }

        for (target, is_fork) in targets {
            self.link_call(func.id, instr, node, args, target, is_fork);
        }
    }

    fn resolve_routine(&self, routine: Value) -> Vec<FunctionId> {
        let mut out = Vec::new();
        if let Value::Function(fid) = routine {
            out.push(fid);
        }
        for fid in self.pta.functions_pointed_by(routine) {
            if !out.contains(&fid) {
                out.push(fid);
            }
        }
        out.retain(|fid| {
            self.module
                .function(*fid)
                .map(|f| !f.is_declaration())
                .unwrap_or(false)
        });
        out
    }

    /// Wire one call site to one defined callee: call edge, actual
    /// parameter nodes and the data flow through them.
    fn link_call(
        &mut self,
        caller: FunctionId,
        instr: &Instruction,
        call_node: SDGNodeId,
        args: &[Value],
        callee: FunctionId,
        is_fork: bool,
    ) {
        self.queue_function(callee);
        // callees are built lazily: record the linkage now, the edges
        // are completed in finish_call_links once everything is mirrored
        self.sdg.add_call_edge(instr.id, caller, callee, is_fork);
        if let Some(fsdg) = self.sdg.function_mut(callee) {
            if !fsdg.callers.contains(&call_node) {
                fsdg.callers.push(call_node);
            }
        }

        // actual parameter nodes for the argument values
        for arg in args {
            self.add_actual_parameter(caller, instr.id, call_node, *arg);
        }
    }

    fn add_actual_parameter(
        &mut self,
        caller: FunctionId,
        call: ValueId,
        call_node: SDGNodeId,
        value: Value,
    ) -> (SDGNodeId, SDGNodeId) {
        if let Some(params) = self.sdg.call_params(call) {
            if let Some(&pair) = params.actual.get(&value) {
                return pair;
            }
        }
        let ain = self.sdg.create_node(SDGNodeKind::ActualIn(call, value));
        let aout = self.sdg.create_node(SDGNodeKind::ActualOut(call, value));
        self.sdg.node_mut(ain).function = Some(caller);
        self.sdg.node_mut(aout).function = Some(caller);
        self.sdg.add_edge(call_node, ain, DepKind::Control);
        self.sdg.add_edge(call_node, aout, DepKind::Control);
        // the passed value feeds the actual-in
        if let Some(vnode) = self.sdg.node_of_value(value) {
            self.sdg.add_edge(vnode, ain, DepKind::Use);
        }
        self.sdg
            .call_params_mut(call)
            .actual
            .insert(value, (ain, aout));
        (ain, aout)
    }

    fn add_formal_parameter(&mut self, fid: FunctionId, value: Value) -> bool {
        let Some(fsdg) = self.sdg.function(fid) else {
            return false;
        };
        if fsdg.params.formal.contains_key(&value) {
            return false;
        }
        let entry = fsdg.entry_node;
        let fin = self.sdg.create_node(SDGNodeKind::FormalIn(fid, value));
        let fout = self.sdg.create_node(SDGNodeKind::FormalOut(fid, value));
        self.sdg.add_edge(entry, fin, DepKind::Control);
        self.sdg.add_edge(entry, fout, DepKind::Control);
        self.sdg
            .function_mut(fid)
            .expect("checked")
            .params
            .formal
            .insert(value, (fin, fout));
        true
    }

    fn add_formal_global(&mut self, fid: FunctionId, value: Value) -> bool {
        let added = self.add_formal_parameter(fid, value);
        if added {
            // for the entry function the global's own node feeds the
            // formal input
            if Some(fid) == self.sdg.entry_function {
                if let (Some(gnode), Some(&(fin, _))) = (
                    self.sdg.node_of_value(value),
                    self.sdg
                        .function(fid)
                        .and_then(|f| f.params.formal.get(&value)),
                ) {
                    self.sdg.add_edge(gnode, fin, DepKind::Control);
                }
            }
        }
        added
    }

    /// Globals (and escaping heap allocations) used inside a callee are
    /// re-exposed as formal/actual parameters all the way up the call
    /// chain, fixpointed so every caller sees every transitively used
    /// one. Also completes the call/entry/exit edges and the
    /// actual-formal data flow.
    fn propagate_global_parameters(&mut self) {
        loop {
            let mut changed = false;

            let call_sites: Vec<(ValueId, Vec<FunctionId>)> = self
                .sdg
                .call_sites()
                .map(|(c, fs)| (*c, fs.clone()))
                .collect();

            for (call, callees) in call_sites {
                let Some(caller) = self.index.function_of_value(call) else {
                    continue;
                };
                let Some(call_node) = self.sdg.node_of_instr(call) else {
                    continue;
                };

                for callee in callees {
                    let Some(callee_sdg) = self.sdg.function(callee) else {
                        continue;
                    };
                    let formal_values: Vec<Value> = callee_sdg
                        .params
                        .formal
                        .keys()
                        .filter(|v| matches!(v, Value::Global(_) | Value::Instr(_)))
                        .copied()
                        .collect();

                    for value in formal_values {
                        // arguments are already actual params; globals
                        // and escaped allocations get lifted here
                        if !matches!(value, Value::Global(_)) {
                            // only lift allocations, not plain args: an
                            // arg value belongs to the callee itself
                            let is_callee_param = self
                                .module
                                .function(callee)
                                .map(|f| f.params.iter().any(|p| Value::Instr(p.id) == value))
                                .unwrap_or(false);
                            if is_callee_param {
                                continue;
                            }
                        }

                        let had = self
                            .sdg
                            .call_params(call)
                            .map(|p| p.actual.contains_key(&value))
                            .unwrap_or(false);
                        if !had {
                            self.add_actual_parameter(caller, call, call_node, value);
                            changed = true;
                        }
                        if matches!(value, Value::Global(_)) {
                            changed |= self.add_formal_global(caller, value);
                        } else {
                            changed |= self.add_formal_parameter(caller, value);
                        }
                    }
                }
            }

            if !changed {
                break;
            }
        }

        self.finish_call_links();
    }

    /// Call -> entry control edges, exit -> call data edges, and the
    /// actual/formal parameter data flow.
    fn finish_call_links(&mut self) {
        let call_sites: Vec<(ValueId, Vec<FunctionId>)> = self
            .sdg
            .call_sites()
            .map(|(c, fs)| (*c, fs.clone()))
            .collect();

        for (call, callees) in call_sites {
            let Some(call_node) = self.sdg.node_of_instr(call) else {
                continue;
            };
            for callee in callees {
                let Some(callee_sdg) = self.sdg.function(callee) else {
                    continue;
                };
                let entry = callee_sdg.entry_node;
                let exit = callee_sdg.exit_node;
                let formal = callee_sdg.params.formal.clone();

                if let Some(fsdg) = self.sdg.function_mut(callee) {
                    if !fsdg.callers.contains(&call_node) {
                        fsdg.callers.push(call_node);
                    }
                }

                self.sdg.add_edge(call_node, entry, DepKind::Control);
                if let Some(exit) = exit {
                    self.sdg.add_edge(exit, call_node, DepKind::Data);
                }

                // positional arguments map onto the callee's parameters
                let actual = self
                    .sdg
                    .call_params(call)
                    .map(|p| p.actual.clone())
                    .unwrap_or_default();
                let callee_params: Vec<Value> = self
                    .module
                    .function(callee)
                    .map(|f| f.params.iter().map(|p| Value::Instr(p.id)).collect())
                    .unwrap_or_default();
                let call_args: Vec<Value> = self
                    .index
                    .instruction(call)
                    .map(|i| match &i.op {
                        Opcode::Call { args, .. } => args.clone(),
                        _ => Vec::new(),
                    })
                    .unwrap_or_default();

                for (idx, param_value) in callee_params.iter().enumerate() {
                    let (Some(arg), Some(&(fin, fout))) =
                        (call_args.get(idx), formal.get(param_value))
                    else {
                        continue;
                    };
                    if let Some(&(ain, aout)) = actual.get(arg) {
                        self.sdg.add_edge(ain, fin, DepKind::Data);
                        self.sdg.add_edge(fout, aout, DepKind::Data);
                    }
                }

                // globals and escaped allocations match by identity
                for (value, &(fin, fout)) in &formal {
                    if callee_params.contains(value) {
                        continue;
                    }
                    if let Some(&(ain, aout)) = actual.get(value) {
                        self.sdg.add_edge(ain, fin, DepKind::Data);
                        self.sdg.add_edge(fout, aout, DepKind::Data);
                    }
                }
            }
        }
    }

    /// Use edges for operands, data edges from the data-dependence
    /// engine, and the dbg-intrinsic preservation edges.
    fn add_def_use_edges<D: DefUseQuery>(&mut self, dda: &mut D) {
        let function_ids = self.sdg.function_ids();
        for fid in function_ids {
            let Some(func) = self.module.function(fid) else {
                continue;
            };
            for block in &func.blocks {
                for instr in &block.instructions {
                    let Some(node) = self.sdg.node_of_instr(instr.id) else {
                        continue;
                    };

                    // direct def-use edges to every operand
                    for op in instr.operands() {
                        if let Some(op_node) = self.sdg.node_of_value(op) {
                            self.sdg.add_edge(op_node, node, DepKind::Use);
                        }
                    }

                    // memory dependencies
                    let value = Value::Instr(instr.id);
                    if dda.is_use(value) {
                        for def in dda.definitions_for(value) {
                            match self.sdg.node_of_value(def) {
                                Some(def_node) => {
                                    self.sdg.add_edge(def_node, node, DepKind::Data);
                                }
                                None => {
                                    // a def in a function the graph never
                                    // reached (e.g. spawned thread code
                                    // outside the call tree)
                                    warn!(?def, "definition without a mirrored node");
                                }
                            }
                        }
                    }

                    // keep debug intrinsics in sync with their value
                    match &instr.op {
                        Opcode::DbgDeclare { addr } => {
                            if let Some(vnode) = self.sdg.node_of_value(*addr) {
                                self.sdg.add_edge(node, vnode, DepKind::Use);
                            }
                        }
                        Opcode::DbgValue { value } => {
                            if let Some(vnode) = self.sdg.node_of_value(*value) {
                                self.sdg.add_edge(node, vnode, DepKind::Use);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn add_control_dependencies(&mut self, cd: &ControlDependenceAnalysis) {
        let function_ids = self.sdg.function_ids();
        for fid in function_ids {
            let Some(deps) = cd.block_dependencies(fid) else {
                continue;
            };
            let blocks: Vec<SDGBlockId> = self
                .sdg
                .function(fid)
                .map(|f| f.blocks.clone())
                .unwrap_or_default();

            for &sblock in &blocks {
                let Some(ir_block) = self.sdg.block(sblock).ir_block else {
                    continue;
                };
                let Some(controllers) = deps.get(&ir_block) else {
                    continue;
                };
                let dependent_nodes = self.sdg.block(sblock).nodes.clone();

                for &controller in controllers {
                    // the branch is the controller block's terminator
                    let term = blocks
                        .iter()
                        .find(|b| self.sdg.block(**b).ir_block == Some(controller))
                        .and_then(|b| self.sdg.block(*b).last_node());
                    let Some(term) = term else { continue };
                    for &node in &dependent_nodes {
                        self.sdg.add_edge(term, node, DepKind::Control);
                    }
                }
            }
        }
    }

    /// Formal/actual no-return sentinels and the flood of dependencies
    /// onto everything that only executes when a call returns.
    fn add_noreturn_dependencies(&mut self, cd: &ControlDependenceAnalysis) {
        let Some(noret) = cd.no_returns() else {
            return;
        };

        let function_ids = self.sdg.function_ids();
        for fid in function_ids {
            let Some(func) = self.module.function(fid) else {
                continue;
            };
            let points = noret.no_return_points(func);
            if points.is_empty() {
                continue;
            }

            let fnoret = self.get_or_create_formal_noreturn(fid);
            for point in points {
                if let Some(pnode) = self.sdg.node_of_instr(point) {
                    self.sdg.add_edge(pnode, fnoret, DepKind::Control);
                }
            }

            // every caller gets an actual no-return hanging off the
            // formal one
            let callers: Vec<SDGNodeId> = self
                .sdg
                .function(fid)
                .map(|f| f.callers.clone())
                .unwrap_or_default();
            for caller in callers {
                let Some(call_instr) = self.sdg.node(caller).instruction() else {
                    continue;
                };
                let actnoret = self.get_or_create_actual_noreturn(call_instr, caller);
                self.sdg.add_edge(fnoret, actnoret, DepKind::Control);
                self.flood_noreturn(call_instr, actnoret);
            }
        }
    }

    fn get_or_create_formal_noreturn(&mut self, fid: FunctionId) -> SDGNodeId {
        if let Some(existing) = self.sdg.function(fid).and_then(|f| f.params.noreturn) {
            return existing;
        }
        let node = self.sdg.create_node(SDGNodeKind::FormalNoReturn(fid));
        if let Some(fsdg) = self.sdg.function_mut(fid) {
            fsdg.params.noreturn = Some(node);
            let entry = fsdg.entry_node;
            self.sdg.add_edge(entry, node, DepKind::Control);
        }
        node
    }

    fn get_or_create_actual_noreturn(&mut self, call: ValueId, call_node: SDGNodeId) -> SDGNodeId {
        if let Some(existing) = self.sdg.call_params(call).and_then(|p| p.noreturn) {
            return existing;
        }
        let node = self.sdg.create_node(SDGNodeKind::ActualNoReturn(call));
        self.sdg.node_mut(node).function = self.index.function_of_value(call);
        self.sdg.add_edge(call_node, node, DepKind::Control);
        self.sdg.call_params_mut(call).noreturn = Some(node);
        node
    }

    /// Everything after the call in its block, and every node in blocks
    /// reachable from it, only runs when the call returns.
    fn flood_noreturn(&mut self, call: ValueId, actnoret: SDGNodeId) {
        let Some(loc) = self.index.location(call) else {
            return;
        };
        let Some(fsdg) = self.sdg.function(loc.function) else {
            return;
        };
        let blocks = fsdg.blocks.clone();
        let Some(&home) = blocks
            .iter()
            .find(|b| self.sdg.block(**b).ir_block == Some(loc.block))
        else {
            return;
        };

        // rest of the call's own block
        let after: Vec<SDGNodeId> = self
            .sdg
            .block(home)
            .nodes
            .iter()
            .copied()
            .skip(loc.index + 1)
            .collect();
        for node in after {
            self.sdg.add_edge(actnoret, node, DepKind::Control);
        }

        // flood the reachable blocks
        let mut visited: FxHashSet<SDGBlockId> = FxHashSet::default();
        let mut queue: QueueLifo<SDGBlockId> = QueueLifo::new();
        for edge in &self.sdg.block(home).successors {
            if visited.insert(edge.target) {
                queue.push(edge.target);
            }
        }
        while let Some(bid) = queue.pop() {
            let nodes = self.sdg.block(bid).nodes.clone();
            for node in nodes {
                self.sdg.add_edge(actnoret, node, DepKind::Control);
            }
            let succs: Vec<SDGBlockId> =
                self.sdg.block(bid).successors.iter().map(|e| e.target).collect();
            for succ in succs {
                if visited.insert(succ) {
                    queue.push(succ);
                }
            }
        }
    }

    /// Loads and stores in may-happen-in-parallel regions with
    /// overlapping points-to sets interfere.
    fn add_interference_edges<T: ThreadRegions>(&mut self, regions: &T) {
        for region in regions.regions() {
            let current = regions.instructions_of(region).to_vec();
            for parallel in regions.parallel_regions(region) {
                let other = regions.instructions_of(parallel).to_vec();
                self.interference_between(&current, &other);
            }
        }
    }

    fn interference_between(&mut self, load_side: &[ValueId], store_side: &[ValueId]) {
        for &load_id in load_side {
            let Some(load_instr) = self.index.instruction(load_id) else {
                continue;
            };
            let Opcode::Load { ptr: load_ptr, .. } = &load_instr.op else {
                continue;
            };
            let Some(load_node) = self.sdg.node_of_instr(load_id) else {
                continue;
            };
            let Some(load_pts) = self.pta.points_to(*load_ptr) else {
                continue;
            };

            for &store_id in store_side {
                let Some(store_instr) = self.index.instruction(store_id) else {
                    continue;
                };
                let Opcode::Store { ptr: store_ptr, .. } = &store_instr.op else {
                    continue;
                };
                let Some(store_node) = self.sdg.node_of_instr(store_id) else {
                    continue;
                };
                let Some(store_pts) = self.pta.points_to(*store_ptr) else {
                    continue;
                };

                let mut interferes = load_pts.has_unknown || store_pts.has_unknown;
                if !interferes {
                    'outer: for lp in &load_pts.pointers {
                        for sp in &store_pts.pointers {
                            if lp.value == sp.value && offsets_may_equal(lp.offset, sp.offset) {
                                interferes = true;
                                break 'outer;
                            }
                        }
                    }
                }
                if interferes {
                    self.sdg
                        .add_edge(store_node, load_node, DepKind::Interference);
                }
            }
        }
    }

    /// A fork only matters when its join does (the thread's effects are
    /// awaited there), and the joined functions' returns feed the join.
    fn add_fork_join_edges<T: ThreadRegions>(&mut self, regions: &T) {
        for &join in regions.joins() {
            let Some(join_node) = self.sdg.node_of_instr(join) else {
                continue;
            };
            for fork in regions.corresponding_forks(join) {
                if let Some(fork_node) = self.sdg.node_of_instr(fork) {
                    self.sdg.add_edge(join_node, fork_node, DepKind::Control);
                }
            }
            for fid in regions.joined_functions(join) {
                let rets = self.return_nodes_of(fid);
                for ret in rets {
                    self.sdg.add_edge(join_node, ret, DepKind::ForkJoin);
                }
            }
        }
    }

    fn return_nodes_of(&self, fid: FunctionId) -> Vec<SDGNodeId> {
        let Some(func) = self.module.function(fid) else {
            return Vec::new();
        };
        let mut rets = Vec::new();
        for block in &func.blocks {
            for instr in &block.instructions {
                if matches!(instr.op, Opcode::Ret { .. }) {
                    if let Some(node) = self.sdg.node_of_instr(instr.id) {
                        rets.push(node);
                    }
                }
            }
        }
        rets
    }

    fn add_critical_sections<T: ThreadRegions>(&mut self, regions: &T) {
        for &lock in regions.locks() {
            let Some(lock_node) = self.sdg.node_of_instr(lock) else {
                continue;
            };
            for instr in regions.critical_section_of(lock) {
                match self.sdg.node_of_instr(instr) {
                    Some(node) => {
                        self.sdg.add_edge(lock_node, node, DepKind::Control);
                    }
                    None => warn!(
                        ?instr,
                        "critical-section instruction without a node, cannot set up lock dependence"
                    ),
                }
            }
            for unlock in regions.corresponding_unlocks(lock) {
                if let Some(unlock_node) = self.sdg.node_of_instr(unlock) {
                    self.sdg.add_edge(unlock_node, lock_node, DepKind::Control);
                }
            }
        }
    }
}

fn offsets_may_equal(a: Offset, b: Offset) -> bool {
    a.is_unknown() || b.is_unknown() || a == b
}
