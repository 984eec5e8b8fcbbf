//! System-dependence-graph nodes and their edge lists.

use crate::shared::models::{FunctionId, GlobalId, Value, ValueId};

/// Handle of an SDG node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SDGNodeId(pub u32);

/// What an SDG node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SDGNodeKind {
    /// Mirror of one IR instruction.
    Instruction(ValueId),
    /// Mirror of one global variable, shared across subgraphs.
    Global(GlobalId),
    /// A function's entry node.
    Entry(FunctionId),
    /// The artificial unified exit of a function.
    UnifiedExit(FunctionId),
    /// Formal parameter (input side) for a value: an argument or a
    /// global re-exposed through the call chain.
    FormalIn(FunctionId, Value),
    FormalOut(FunctionId, Value),
    /// Actual parameter nodes at one call site.
    ActualIn(ValueId, Value),
    ActualOut(ValueId, Value),
    /// No-return sentinels: unreachability propagated across calls.
    FormalNoReturn(FunctionId),
    ActualNoReturn(ValueId),
}

/// The dependence kinds the graph carries; one adjacency list per kind
/// in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepKind {
    Control,
    Data,
    Use,
    Interference,
    ForkJoin,
}

pub const DEP_KINDS: [DepKind; 5] = [
    DepKind::Control,
    DepKind::Data,
    DepKind::Use,
    DepKind::Interference,
    DepKind::ForkJoin,
];

impl DepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepKind::Control => "control",
            DepKind::Data => "data",
            DepKind::Use => "use",
            DepKind::Interference => "interference",
            DepKind::ForkJoin => "fork-join",
        }
    }

    fn index(&self) -> usize {
        match self {
            DepKind::Control => 0,
            DepKind::Data => 1,
            DepKind::Use => 2,
            DepKind::Interference => 3,
            DepKind::ForkJoin => 4,
        }
    }
}

/// Outgoing or incoming edges of one node, one list per kind.
#[derive(Debug, Clone, Default)]
pub struct EdgeLists {
    lists: [Vec<SDGNodeId>; 5],
}

impl EdgeLists {
    pub fn add(&mut self, kind: DepKind, to: SDGNodeId) -> bool {
        let list = &mut self.lists[kind.index()];
        if list.contains(&to) {
            false
        } else {
            list.push(to);
            true
        }
    }

    pub fn remove(&mut self, node: SDGNodeId) {
        for list in &mut self.lists {
            list.retain(|n| *n != node);
        }
    }

    pub fn of(&self, kind: DepKind) -> &[SDGNodeId] {
        &self.lists[kind.index()]
    }

    pub fn iter_all(&self) -> impl Iterator<Item = SDGNodeId> + '_ {
        self.lists.iter().flatten().copied()
    }
}

#[derive(Debug)]
pub struct SDGNode {
    pub id: SDGNodeId,
    pub kind: SDGNodeKind,
    /// The function this node belongs to; global nodes have none.
    pub function: Option<FunctionId>,
    /// 0 = not in any slice; otherwise the id of the slice that keeps
    /// this node.
    pub slice_mark: u32,
    /// Dependencies flowing out of this node (nodes depending on it).
    pub deps: EdgeLists,
    /// Dependencies flowing into this node.
    pub rev: EdgeLists,
}

impl SDGNode {
    pub fn new(id: SDGNodeId, kind: SDGNodeKind) -> Self {
        let function = match kind {
            SDGNodeKind::Entry(f)
            | SDGNodeKind::UnifiedExit(f)
            | SDGNodeKind::FormalIn(f, _)
            | SDGNodeKind::FormalOut(f, _)
            | SDGNodeKind::FormalNoReturn(f) => Some(f),
            _ => None,
        };
        SDGNode {
            id,
            kind,
            function,
            slice_mark: 0,
            deps: EdgeLists::default(),
            rev: EdgeLists::default(),
        }
    }

    pub fn instruction(&self) -> Option<ValueId> {
        match self.kind {
            SDGNodeKind::Instruction(v) => Some(v),
            _ => None,
        }
    }

    /// Parameter and sentinel nodes have no IR counterpart.
    pub fn is_artificial(&self) -> bool {
        !matches!(
            self.kind,
            SDGNodeKind::Instruction(_) | SDGNodeKind::Global(_)
        )
    }
}
