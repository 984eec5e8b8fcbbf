//! Pointer-analysis configuration.

use rustc_hash::FxHashMap;

use crate::shared::offset::Offset;

/// Which solver runs over the pointer graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PtaFlavor {
    /// Flow-insensitive, one points-to set per node.
    #[default]
    FlowInsensitive,
    /// Flow-sensitive, memory maps per program point.
    FlowSensitive,
    /// Flow-sensitive with lifetime invalidation (`free`, end of scope).
    FlowSensitiveInv,
}

impl PtaFlavor {
    /// Does this flavor track lifetime invalidation?
    pub fn invalidates(&self) -> bool {
        matches!(self, PtaFlavor::FlowSensitiveInv)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PtaFlavor::FlowInsensitive => "fi",
            PtaFlavor::FlowSensitive => "fs",
            PtaFlavor::FlowSensitiveInv => "inv",
        }
    }
}

/// Kinds of modelled allocation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationKind {
    Malloc,
    Calloc,
    Alloca,
    Realloc,
}

#[derive(Debug, Clone)]
pub struct PTAOptions {
    pub flavor: PtaFlavor,
    pub entry_function: String,
    /// Field-sensitivity cap: GEP results whose concrete offset exceeds
    /// this collapse to the unknown offset. `Offset::UNKNOWN` = no cap.
    pub field_sensitivity: Offset,
    pub threads: bool,
    /// Force GEPs in CFG loops that feed stores to unknown offsets before
    /// solving (saves fixpoint iterations, costs precision).
    pub preprocess_geps: bool,
    pub allocation_functions: FxHashMap<String, AllocationKind>,
    /// Delegate to an external (SVF-style) engine instead of the built-in
    /// solvers. The built-in pipeline only validates this flag.
    pub is_svf: bool,
    /// Fixpoint ceiling; 0 = unlimited. When exceeded the solver returns
    /// the current sound-but-imprecise result.
    pub max_iterations: usize,
}

impl Default for PTAOptions {
    fn default() -> Self {
        let mut allocation_functions = FxHashMap::default();
        allocation_functions.insert("malloc".to_string(), AllocationKind::Malloc);
        allocation_functions.insert("calloc".to_string(), AllocationKind::Calloc);
        allocation_functions.insert("realloc".to_string(), AllocationKind::Realloc);
        allocation_functions.insert("alloca".to_string(), AllocationKind::Alloca);
        allocation_functions.insert("__builtin_alloca".to_string(), AllocationKind::Alloca);

        PTAOptions {
            flavor: PtaFlavor::default(),
            entry_function: "main".to_string(),
            field_sensitivity: Offset::UNKNOWN,
            threads: false,
            preprocess_geps: true,
            allocation_functions,
            is_svf: false,
            max_iterations: 0,
        }
    }
}

impl PTAOptions {
    pub fn allocation_kind(&self, name: &str) -> Option<AllocationKind> {
        self.allocation_functions.get(name).copied()
    }

    pub fn add_allocation_function(&mut self, name: impl Into<String>, kind: AllocationKind) {
        self.allocation_functions.insert(name.into(), kind);
    }
}
