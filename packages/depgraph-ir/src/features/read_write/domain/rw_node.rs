//! Read/write graph nodes: which abstract byte ranges an instruction
//! reads and writes.

use crate::shared::models::Value;
use crate::shared::offset::{Offset, OffsetInterval};

/// Handle of a read/write node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RWNodeId(pub u32);

/// Handle of a read/write basic block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RWBlockId(pub u32);

/// Handle of a per-function read/write subgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RWSubgraphId(pub u32);

/// The unknown-memory sentinel node; defs and uses whose target could
/// not be mapped land here.
pub const RW_UNKNOWN_MEMORY: RWNodeId = RWNodeId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RWNodeType {
    Alloc,
    DynAlloc,
    Global,
    Load,
    Store,
    Phi,
    Call,
    CallReturn,
    Return,
    Mu,
    InArg,
    OutArg,
    CallIn,
    CallOut,
    Fork,
    Join,
    Generic,
    Noop,
}

impl RWNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RWNodeType::Alloc => "ALLOC",
            RWNodeType::DynAlloc => "DYN_ALLOC",
            RWNodeType::Global => "GLOBAL",
            RWNodeType::Load => "LOAD",
            RWNodeType::Store => "STORE",
            RWNodeType::Phi => "PHI",
            RWNodeType::Call => "CALL",
            RWNodeType::CallReturn => "CALL_RETURN",
            RWNodeType::Return => "RETURN",
            RWNodeType::Mu => "MU",
            RWNodeType::InArg => "INARG",
            RWNodeType::OutArg => "OUTARG",
            RWNodeType::CallIn => "CALLIN",
            RWNodeType::CallOut => "CALLOUT",
            RWNodeType::Fork => "FORK",
            RWNodeType::Join => "JOIN",
            RWNodeType::Generic => "GENERIC",
            RWNodeType::Noop => "NOOP",
        }
    }
}

/// A write to `target[interval]`. `strong` writes are precise enough to
/// kill earlier definitions of the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefSite {
    pub target: RWNodeId,
    pub interval: OffsetInterval,
    pub strong: bool,
}

impl DefSite {
    pub fn new(target: RWNodeId, offset: Offset, len: Offset, strong: bool) -> Self {
        DefSite {
            target,
            interval: OffsetInterval::new(offset, len),
            strong,
        }
    }
}

/// A read of `target[interval]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseSite {
    pub target: RWNodeId,
    pub interval: OffsetInterval,
}

impl UseSite {
    pub fn new(target: RWNodeId, offset: Offset, len: Offset) -> Self {
        UseSite {
            target,
            interval: OffsetInterval::new(offset, len),
        }
    }
}

#[derive(Debug)]
pub struct RWNode {
    pub id: RWNodeId,
    pub ty: RWNodeType,
    pub defs: Vec<DefSite>,
    pub uses: Vec<UseSite>,
    /// IR back-pointer.
    pub value: Option<Value>,
    /// Allocation size for `Alloc`/`DynAlloc`/`Global` nodes.
    pub size: Offset,
    pub is_heap: bool,
    /// The allocation's address escapes into memory.
    pub address_taken: bool,
    /// The block this node sits in.
    pub block: Option<RWBlockId>,
    /// Callee subgraphs of `Call`/`Fork` nodes.
    pub callees: Vec<RWSubgraphId>,
    /// Def-use edges, filled by the data-dependence engine for the eager
    /// dumpers; queries do not depend on them.
    pub defuse: Vec<RWNodeId>,
}

impl RWNode {
    pub fn new(id: RWNodeId, ty: RWNodeType) -> Self {
        RWNode {
            id,
            ty,
            defs: Vec::new(),
            uses: Vec::new(),
            value: None,
            size: Offset::UNKNOWN,
            is_heap: false,
            address_taken: false,
            block: None,
            callees: Vec::new(),
            defuse: Vec::new(),
        }
    }

    pub fn add_def(&mut self, target: RWNodeId, offset: Offset, len: Offset, strong: bool) {
        self.defs.push(DefSite::new(target, offset, len, strong));
    }

    pub fn add_def_site(&mut self, site: DefSite) {
        self.defs.push(site);
    }

    pub fn add_use(&mut self, target: RWNodeId, offset: Offset, len: Offset) {
        self.uses.push(UseSite::new(target, offset, len));
    }

    pub fn add_use_site(&mut self, site: UseSite) {
        self.uses.push(site);
    }

    pub fn is_use(&self) -> bool {
        !self.uses.is_empty()
    }

    pub fn is_def(&self) -> bool {
        !self.defs.is_empty()
    }

    pub fn is_allocation(&self) -> bool {
        matches!(
            self.ty,
            RWNodeType::Alloc | RWNodeType::DynAlloc | RWNodeType::Global
        )
    }
}
