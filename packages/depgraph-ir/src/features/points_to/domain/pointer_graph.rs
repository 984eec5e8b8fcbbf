//! The pointer graph: the intermediate representation consumed by the
//! pointer analysis.
//!
//! Nodes live in one arena owned by the graph; every cross-node reference
//! is a `PGNodeId` handle into that arena. The three sentinels (null
//! memory, unknown memory, invalidated memory) sit at fixed indices so
//! they can be referenced without looking anything up.

use rustc_hash::FxHashMap;

use crate::shared::models::{FunctionId, Value};
use crate::shared::offset::Offset;

use super::pointer::{Pointer, PointsToSet};

/// Handle of a pointer-graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PGNodeId(pub u32);

/// Handle of a per-function pointer subgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PGSubgraphId(pub u32);

pub const NULL_ID: PGNodeId = PGNodeId(0);
pub const UNKNOWN_MEMORY_ID: PGNodeId = PGNodeId(1);
pub const INVALIDATED_ID: PGNodeId = PGNodeId(2);

const SENTINEL_COUNT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PGNodeType {
    Alloc,
    DynAlloc,
    Global,
    Load,
    Store,
    Gep,
    Phi,
    Cast,
    Constant,
    Function,
    Call,
    CallFuncPtr,
    CallReturn,
    Entry,
    Return,
    Memcpy,
    InvalidateLocals,
    InvalidateObject,
    Free,
    Fork,
    Join,
    Noop,
    NullAddr,
    UnknownMem,
    Invalidated,
}

impl PGNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PGNodeType::Alloc => "ALLOC",
            PGNodeType::DynAlloc => "DYN_ALLOC",
            PGNodeType::Global => "GLOBAL",
            PGNodeType::Load => "LOAD",
            PGNodeType::Store => "STORE",
            PGNodeType::Gep => "GEP",
            PGNodeType::Phi => "PHI",
            PGNodeType::Cast => "CAST",
            PGNodeType::Constant => "CONSTANT",
            PGNodeType::Function => "FUNCTION",
            PGNodeType::Call => "CALL",
            PGNodeType::CallFuncPtr => "CALL_FUNCPTR",
            PGNodeType::CallReturn => "CALL_RETURN",
            PGNodeType::Entry => "ENTRY",
            PGNodeType::Return => "RETURN",
            PGNodeType::Memcpy => "MEMCPY",
            PGNodeType::InvalidateLocals => "INVALIDATE_LOCALS",
            PGNodeType::InvalidateObject => "INVALIDATE_OBJECT",
            PGNodeType::Free => "FREE",
            PGNodeType::Fork => "FORK",
            PGNodeType::Join => "JOIN",
            PGNodeType::Noop => "NOOP",
            PGNodeType::NullAddr => "NULL_ADDR",
            PGNodeType::UnknownMem => "UNKNOWN_MEM",
            PGNodeType::Invalidated => "INVALIDATED",
        }
    }

    /// Is this a node that stands for a memory object?
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            PGNodeType::Alloc
                | PGNodeType::DynAlloc
                | PGNodeType::Global
                | PGNodeType::UnknownMem
        )
    }
}

/// Allocation attributes for `Alloc`/`DynAlloc`/`Global` nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocAttrs {
    pub size: Offset,
    pub is_heap: bool,
    pub zeroed: bool,
}

#[derive(Debug)]
pub struct PGNode {
    pub id: PGNodeId,
    pub ty: PGNodeType,
    /// Typed operand edges (what this node consumes).
    pub operands: Vec<PGNodeId>,
    /// Position in the pointer graph's CFG.
    pub successors: Vec<PGNodeId>,
    pub predecessors: Vec<PGNodeId>,
    pub points_to: PointsToSet,
    /// IR value back-pointer (user data).
    pub value: Option<Value>,
    pub alloc: Option<AllocAttrs>,
    /// `Gep` byte offset or `Memcpy` length.
    pub offset: Offset,
    /// Owning subgraph; sentinels have none.
    pub subgraph: Option<PGSubgraphId>,
    /// Resolved callee subgraphs of `Call`/`CallFuncPtr`/`Fork` nodes.
    pub callees: Vec<PGSubgraphId>,
    /// The function a `Function` node denotes.
    pub function: Option<FunctionId>,
}

impl PGNode {
    fn new(id: PGNodeId, ty: PGNodeType) -> Self {
        PGNode {
            id,
            ty,
            operands: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            points_to: PointsToSet::new(),
            value: None,
            alloc: None,
            offset: Offset::ZERO,
            subgraph: None,
            callees: Vec::new(),
            function: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.id.0 < SENTINEL_COUNT
    }
}

/// Per-function container of pointer-graph nodes.
#[derive(Debug)]
pub struct PGSubgraph {
    pub id: PGSubgraphId,
    pub function: FunctionId,
    /// The root `Entry` node.
    pub root: PGNodeId,
    /// The unified `Return` node gathering all returned values.
    pub ret: PGNodeId,
    /// All nodes of the subgraph, in construction order.
    pub nodes: Vec<PGNodeId>,
    /// One `Phi` node per formal parameter, gathering actual arguments.
    pub params: Vec<PGNodeId>,
    /// Call sites calling into this subgraph.
    pub callers: Vec<PGNodeId>,
}

#[derive(Debug, Default)]
pub struct PointerGraph {
    nodes: Vec<PGNode>,
    subgraphs: Vec<PGSubgraph>,
    /// Global nodes plus the nodes modelling global initializers; these
    /// are processed before any function.
    globals: Vec<PGNodeId>,
    entry: Option<PGSubgraphId>,
    /// IR value to node mapping.
    values: FxHashMap<Value, PGNodeId>,
}

impl PointerGraph {
    pub fn new() -> Self {
        let mut graph = PointerGraph {
            nodes: Vec::new(),
            subgraphs: Vec::new(),
            globals: Vec::new(),
            entry: None,
            values: FxHashMap::default(),
        };

        // sentinels at fixed indices
        let null = graph.create_node(PGNodeType::NullAddr);
        debug_assert_eq!(null, NULL_ID);
        let unknown = graph.create_node(PGNodeType::UnknownMem);
        debug_assert_eq!(unknown, UNKNOWN_MEMORY_ID);
        let invalidated = graph.create_node(PGNodeType::Invalidated);
        debug_assert_eq!(invalidated, INVALIDATED_ID);

        graph.nodes[null.0 as usize].points_to.insert(Pointer::null());
        graph.nodes[unknown.0 as usize]
            .points_to
            .insert(Pointer::unknown());

        graph
    }

    pub fn create_node(&mut self, ty: PGNodeType) -> PGNodeId {
        let id = PGNodeId(self.nodes.len() as u32);
        self.nodes.push(PGNode::new(id, ty));
        id
    }

    pub fn create_subgraph(&mut self, function: FunctionId) -> PGSubgraphId {
        let id = PGSubgraphId(self.subgraphs.len() as u32);
        let root = self.create_node(PGNodeType::Entry);
        let ret = self.create_node(PGNodeType::Return);
        self.nodes[root.0 as usize].subgraph = Some(id);
        self.nodes[ret.0 as usize].subgraph = Some(id);
        self.subgraphs.push(PGSubgraph {
            id,
            function,
            root,
            ret,
            nodes: vec![root, ret],
            params: Vec::new(),
            callers: Vec::new(),
        });
        id
    }

    pub fn create_node_in(&mut self, ty: PGNodeType, subgraph: PGSubgraphId) -> PGNodeId {
        let id = self.create_node(ty);
        self.nodes[id.0 as usize].subgraph = Some(subgraph);
        self.subgraphs[subgraph.0 as usize].nodes.push(id);
        id
    }

    pub fn node(&self, id: PGNodeId) -> &PGNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: PGNodeId) -> &mut PGNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn subgraph(&self, id: PGSubgraphId) -> &PGSubgraph {
        &self.subgraphs[id.0 as usize]
    }

    pub fn subgraph_mut(&mut self, id: PGSubgraphId) -> &mut PGSubgraph {
        &mut self.subgraphs[id.0 as usize]
    }

    pub fn subgraphs(&self) -> &[PGSubgraph] {
        &self.subgraphs
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PGNode> {
        self.nodes.iter()
    }

    pub fn set_entry(&mut self, id: PGSubgraphId) {
        self.entry = Some(id);
    }

    pub fn entry(&self) -> Option<PGSubgraphId> {
        self.entry
    }

    pub fn add_global(&mut self, id: PGNodeId) {
        self.globals.push(id);
    }

    pub fn globals(&self) -> &[PGNodeId] {
        &self.globals
    }

    pub fn add_operand(&mut self, node: PGNodeId, operand: PGNodeId) {
        self.nodes[node.0 as usize].operands.push(operand);
    }

    pub fn add_successor(&mut self, from: PGNodeId, to: PGNodeId) {
        if !self.nodes[from.0 as usize].successors.contains(&to) {
            self.nodes[from.0 as usize].successors.push(to);
            self.nodes[to.0 as usize].predecessors.push(from);
        }
    }

    pub fn map_value(&mut self, value: Value, node: PGNodeId) {
        self.values.insert(value, node);
        if self.nodes[node.0 as usize].value.is_none() {
            self.nodes[node.0 as usize].value = Some(value);
        }
    }

    pub fn node_of(&self, value: Value) -> Option<PGNodeId> {
        self.values.get(&value).copied()
    }

    /// All nodes reachable from `start` following CFG successor edges.
    /// Call edges (`Call` to callee `Entry`, callee `Return` to
    /// `CallReturn`) are successor edges, so interprocedural reachability
    /// needs no special casing. DFS preorder from the start node.
    pub fn nodes_from(&self, start: &[PGNodeId]) -> Vec<PGNodeId> {
        let mut order = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<PGNodeId> = Vec::new();

        for &s in start {
            if !visited[s.0 as usize] {
                visited[s.0 as usize] = true;
                stack.push(s);
            }
            while let Some(cur) = stack.pop() {
                order.push(cur);
                // push in reverse so the first successor is visited first
                for &succ in self.nodes[cur.0 as usize].successors.iter().rev() {
                    if !visited[succ.0 as usize] {
                        visited[succ.0 as usize] = true;
                        stack.push(succ);
                    }
                }
            }
        }

        order
    }

    /// Strongly connected components of one subgraph's CFG with more than
    /// one node (the loops). Iterative Tarjan.
    pub fn subgraph_loops(&self, sg: PGSubgraphId) -> Vec<Vec<PGNodeId>> {
        let members: Vec<PGNodeId> = self.subgraphs[sg.0 as usize].nodes.clone();
        let in_sg: FxHashMap<PGNodeId, usize> =
            members.iter().enumerate().map(|(i, &n)| (n, i)).collect();

        let n = members.len();
        let mut index = vec![usize::MAX; n];
        let mut lowlink = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut next_index = 0usize;
        let mut sccs = Vec::new();

        // explicit DFS stack: (node, next successor position)
        for start in 0..n {
            if index[start] != usize::MAX {
                continue;
            }
            let mut work: Vec<(usize, usize)> = vec![(start, 0)];
            while let Some(&mut (v, ref mut succ_pos)) = work.last_mut() {
                if *succ_pos == 0 {
                    index[v] = next_index;
                    lowlink[v] = next_index;
                    next_index += 1;
                    stack.push(v);
                    on_stack[v] = true;
                }

                let succs: Vec<usize> = self.nodes[members[v].0 as usize]
                    .successors
                    .iter()
                    .filter_map(|s| in_sg.get(s).copied())
                    .collect();

                if *succ_pos < succs.len() {
                    let w = succs[*succ_pos];
                    *succ_pos += 1;
                    if index[w] == usize::MAX {
                        work.push((w, 0));
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(index[w]);
                    }
                } else {
                    work.pop();
                    if let Some(&(parent, _)) = work.last() {
                        lowlink[parent] = lowlink[parent].min(lowlink[v]);
                    }
                    if lowlink[v] == index[v] {
                        let mut component = Vec::new();
                        loop {
                            let w = stack.pop().expect("tarjan stack underflow");
                            on_stack[w] = false;
                            component.push(members[w]);
                            if w == v {
                                break;
                            }
                        }
                        if component.len() > 1 {
                            sccs.push(component);
                        }
                    }
                }
            }
        }

        sccs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_sit_at_fixed_indices() {
        let graph = PointerGraph::new();
        assert_eq!(graph.node(NULL_ID).ty, PGNodeType::NullAddr);
        assert_eq!(graph.node(UNKNOWN_MEMORY_ID).ty, PGNodeType::UnknownMem);
        assert_eq!(graph.node(INVALIDATED_ID).ty, PGNodeType::Invalidated);
        assert!(graph.node(NULL_ID).is_sentinel());
    }

    #[test]
    fn reachability_follows_successor_edges() {
        let mut graph = PointerGraph::new();
        let sg = graph.create_subgraph(FunctionId(0));
        let root = graph.subgraph(sg).root;
        let a = graph.create_node_in(PGNodeType::Alloc, sg);
        let b = graph.create_node_in(PGNodeType::Store, sg);
        graph.add_successor(root, a);
        graph.add_successor(a, b);

        let order = graph.nodes_from(&[root]);
        assert_eq!(order, vec![root, a, b]);
    }

    #[test]
    fn loops_are_nontrivial_sccs() {
        let mut graph = PointerGraph::new();
        let sg = graph.create_subgraph(FunctionId(0));
        let root = graph.subgraph(sg).root;
        let a = graph.create_node_in(PGNodeType::Gep, sg);
        let b = graph.create_node_in(PGNodeType::Store, sg);
        let c = graph.create_node_in(PGNodeType::Load, sg);
        graph.add_successor(root, a);
        graph.add_successor(a, b);
        graph.add_successor(b, a);
        graph.add_successor(b, c);

        let loops = graph.subgraph_loops(sg);
        assert_eq!(loops.len(), 1);
        let mut l = loops[0].clone();
        l.sort();
        assert_eq!(l, vec![a, b]);
    }
}
