//! Aggregated configuration of the whole analysis pipeline and the
//! slicer on top of it.

use crate::features::control_dep::application::options::CDOptions;
use crate::features::data_flow::application::options::DDAOptions;
use crate::features::points_to::application::options::{AllocationKind, PTAOptions};

#[derive(Debug, Clone, Default)]
pub struct DgOptions {
    pub pta: PTAOptions,
    pub dda: DDAOptions,
    pub cd: CDOptions,
    pub threads: bool,
    pub entry_function: String,
    /// Run the structural verifier on the freshly built graph's module.
    pub verify_graph: bool,
}

impl DgOptions {
    pub fn new(entry_function: impl Into<String>) -> Self {
        let entry = entry_function.into();
        let mut options = DgOptions {
            entry_function: entry.clone(),
            verify_graph: true,
            ..Default::default()
        };
        options.pta.entry_function = entry;
        options
    }

    /// Register an allocation function with both analyses that care.
    pub fn add_allocation_function(&mut self, name: impl Into<String>, kind: AllocationKind) {
        self.pta.add_allocation_function(name.into(), kind);
    }

    /// Normalise the sub-option structs against the top-level switches.
    pub fn normalized(mut self) -> Self {
        if self.entry_function.is_empty() {
            self.entry_function = "main".to_string();
        }
        self.pta.entry_function = self.entry_function.clone();
        self.pta.threads = self.threads;
        self.dda.threads = self.threads;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SlicerOptions {
    pub dg_options: DgOptions,
    /// Bodies of these functions are never touched by the cut phase.
    pub preserved_functions: Vec<String>,
    /// `line:col` or `function:line:col`, several separated by `;`.
    pub slicing_criteria: String,
    /// Legacy `function#block#n` criteria.
    pub legacy_slicing_criteria: String,
    pub forward_slicing: bool,
    /// Slice away the criteria themselves when nothing in the slice
    /// depends on them.
    pub remove_slicing_criteria: bool,
    /// The criteria denote the instruction after the matched one.
    pub criteria_are_next_instr: bool,
    pub input_file: String,
    pub output_file: String,
}
