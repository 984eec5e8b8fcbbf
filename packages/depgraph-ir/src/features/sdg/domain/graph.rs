//! The system dependence graph: per-function dependence graphs linked by
//! call and parameter edges, plus the module-wide registry of built
//! functions.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::shared::models::{FunctionId, GlobalId, Value, ValueId};

use super::block::{SDGBlock, SDGBlockId};
use super::node::{DepKind, SDGNode, SDGNodeId, SDGNodeKind};

/// Parameter record of one call site.
#[derive(Debug, Default)]
pub struct CallParams {
    /// Actual in/out node pair per passed value (arguments and globals).
    pub actual: FxHashMap<Value, (SDGNodeId, SDGNodeId)>,
    pub noreturn: Option<SDGNodeId>,
}

/// Parameter record of one function.
#[derive(Debug, Default)]
pub struct FormalParams {
    pub formal: FxHashMap<Value, (SDGNodeId, SDGNodeId)>,
    pub noreturn: Option<SDGNodeId>,
}

/// One function's dependence graph inside the SDG.
#[derive(Debug)]
pub struct FunctionSdg {
    pub function: FunctionId,
    pub entry_node: SDGNodeId,
    pub exit_node: Option<SDGNodeId>,
    pub entry_block: Option<SDGBlockId>,
    pub exit_block: Option<SDGBlockId>,
    pub blocks: Vec<SDGBlockId>,
    pub params: FormalParams,
    /// Call sites that call into this function.
    pub callers: Vec<SDGNodeId>,
}

/// The whole-module system dependence graph. The function registry here
/// is the per-module replacement of the old process-global
/// constructed-functions table.
#[derive(Debug, Default)]
pub struct Sdg {
    nodes: Vec<SDGNode>,
    blocks: Vec<SDGBlock>,
    functions: FxHashMap<FunctionId, FunctionSdg>,
    globals: FxHashMap<GlobalId, SDGNodeId>,
    instr_nodes: FxHashMap<ValueId, SDGNodeId>,
    call_params: FxHashMap<ValueId, CallParams>,
    /// Call site -> callee functions (the call graph).
    call_edges: FxHashMap<ValueId, Vec<FunctionId>>,
    /// (caller, callee) pairs, for the context-aware slice walk.
    call_pairs: FxHashSet<(FunctionId, FunctionId)>,
    /// (spawner, routine) pairs of thread forks; these do not bound the
    /// walk the way plain calls do.
    fork_pairs: FxHashSet<(FunctionId, FunctionId)>,
    pub entry_function: Option<FunctionId>,
}

impl Sdg {
    pub fn new() -> Self {
        Sdg::default()
    }

    pub fn create_node(&mut self, kind: SDGNodeKind) -> SDGNodeId {
        let id = SDGNodeId(self.nodes.len() as u32);
        self.nodes.push(SDGNode::new(id, kind));
        if let SDGNodeKind::Instruction(v) = kind {
            self.instr_nodes.insert(v, id);
        }
        id
    }

    pub fn create_block(
        &mut self,
        function: FunctionId,
        ir_block: Option<crate::shared::models::BlockId>,
    ) -> SDGBlockId {
        let id = SDGBlockId(self.blocks.len() as u32);
        self.blocks.push(SDGBlock::new(id, function, ir_block));
        id
    }

    pub fn node(&self, id: SDGNodeId) -> &SDGNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: SDGNodeId) -> &mut SDGNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn block(&self, id: SDGBlockId) -> &SDGBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: SDGBlockId) -> &mut SDGBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SDGNode> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &SDGBlock> {
        self.blocks.iter()
    }

    /// Add a dependence edge: `to` depends on `from`.
    pub fn add_edge(&mut self, from: SDGNodeId, to: SDGNodeId, kind: DepKind) -> bool {
        if from == to {
            return false;
        }
        let added = self.nodes[from.0 as usize].deps.add(kind, to);
        if added {
            self.nodes[to.0 as usize].rev.add(kind, from);
        }
        added
    }

    pub fn add_block_edge(&mut self, from: SDGBlockId, to: SDGBlockId, label: u8) -> bool {
        let added = self.blocks[from.0 as usize].add_successor(to, label);
        if added && !self.blocks[to.0 as usize].predecessors.contains(&from) {
            self.blocks[to.0 as usize].predecessors.push(from);
        }
        added
    }

    pub fn append_node(&mut self, block: SDGBlockId, node: SDGNodeId) {
        self.blocks[block.0 as usize].nodes.push(node);
    }

    pub fn node_of_instr(&self, instr: ValueId) -> Option<SDGNodeId> {
        self.instr_nodes.get(&instr).copied()
    }

    /// Let a function parameter's value resolve to its formal-in node in
    /// operand position.
    pub fn map_param(&mut self, param: ValueId, node: SDGNodeId) {
        self.instr_nodes.insert(param, node);
    }

    pub fn node_of_value(&self, value: Value) -> Option<SDGNodeId> {
        match value {
            Value::Instr(v) => self.node_of_instr(v),
            Value::Global(g) => self.globals.get(&g).copied(),
            _ => None,
        }
    }

    pub fn add_global(&mut self, global: GlobalId) -> SDGNodeId {
        let node = self.create_node(SDGNodeKind::Global(global));
        self.globals.insert(global, node);
        node
    }

    pub fn global_node(&self, global: GlobalId) -> Option<SDGNodeId> {
        self.globals.get(&global).copied()
    }

    pub fn globals(&self) -> impl Iterator<Item = (&GlobalId, &SDGNodeId)> {
        self.globals.iter()
    }

    pub fn insert_function(&mut self, sdg: FunctionSdg) {
        self.functions.insert(sdg.function, sdg);
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionSdg> {
        self.functions.get(&id)
    }

    pub fn function_mut(&mut self, id: FunctionId) -> Option<&mut FunctionSdg> {
        self.functions.get_mut(&id)
    }

    pub fn functions(&self) -> impl Iterator<Item = (&FunctionId, &FunctionSdg)> {
        self.functions.iter()
    }

    pub fn function_ids(&self) -> Vec<FunctionId> {
        self.functions.keys().copied().collect()
    }

    pub fn is_built(&self, id: FunctionId) -> bool {
        self.functions.contains_key(&id)
    }

    pub fn call_params(&self, call: ValueId) -> Option<&CallParams> {
        self.call_params.get(&call)
    }

    pub fn call_params_mut(&mut self, call: ValueId) -> &mut CallParams {
        self.call_params.entry(call).or_default()
    }

    pub fn add_call_edge(
        &mut self,
        call: ValueId,
        caller: FunctionId,
        callee: FunctionId,
        is_fork: bool,
    ) {
        let callees = self.call_edges.entry(call).or_default();
        if !callees.contains(&callee) {
            callees.push(callee);
        }
        self.call_pairs.insert((caller, callee));
        if is_fork {
            self.fork_pairs.insert((caller, callee));
        }
    }

    pub fn calls(&self, caller: FunctionId, callee: FunctionId) -> bool {
        self.call_pairs.contains(&(caller, callee))
    }

    pub fn forks(&self, caller: FunctionId, callee: FunctionId) -> bool {
        self.fork_pairs.contains(&(caller, callee))
    }

    pub fn callees_of(&self, call: ValueId) -> &[FunctionId] {
        self.call_edges
            .get(&call)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn call_sites(&self) -> impl Iterator<Item = (&ValueId, &Vec<FunctionId>)> {
        self.call_edges.iter()
    }

    /// Detach a node from the dependence structure: every edge into or
    /// out of it is dropped. Used when the slicer destroys a node.
    pub fn remove_node_edges(&mut self, node: SDGNodeId) {
        let incoming: Vec<SDGNodeId> = self.nodes[node.0 as usize].rev.iter_all().collect();
        let outgoing: Vec<SDGNodeId> = self.nodes[node.0 as usize].deps.iter_all().collect();
        for other in incoming {
            self.nodes[other.0 as usize].deps.remove(node);
        }
        for other in outgoing {
            self.nodes[other.0 as usize].rev.remove(node);
        }
        self.nodes[node.0 as usize].deps = Default::default();
        self.nodes[node.0 as usize].rev = Default::default();
    }
}
