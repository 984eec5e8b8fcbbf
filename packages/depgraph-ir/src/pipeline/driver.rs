//! The slicing driver: criteria resolution, pipeline run, mark and cut,
//! post-slice verification.

use tracing::{debug, info};

use crate::errors::Result;
use crate::features::sdg::domain::SDGNodeId;
use crate::features::slicing::infrastructure::criteria::resolve_criteria;
use crate::features::slicing::infrastructure::slicer::{SliceStats, Slicer};
use crate::features::slicing::infrastructure::verify::verify_module;
use crate::shared::models::{Module, ModuleIndex};

use super::builder::build_dependence_graph;
use super::options::SlicerOptions;

/// What happened to the module.
#[derive(Debug)]
pub enum SliceOutcome {
    /// No criteria were given; the module is untouched.
    NoCriteria,
    /// Criteria were given but matched no instruction.
    NothingMatched,
    Sliced {
        stats: SliceStats,
        /// Structural violations found after the cut. The module is
        /// emitted regardless; the caller decides the exit code.
        verification_errors: Vec<String>,
    },
}

/// Slice `module` in place according to `options`.
pub fn run_slicer(module: &mut Module, options: &SlicerOptions) -> Result<SliceOutcome> {
    if options.slicing_criteria.trim().is_empty()
        && options.legacy_slicing_criteria.trim().is_empty()
    {
        // an empty criterion list leaves the module untouched
        return Ok(SliceOutcome::NoCriteria);
    }

    let criteria_ids = resolve_criteria(
        module,
        &options.slicing_criteria,
        &options.legacy_slicing_criteria,
        options.criteria_are_next_instr,
    )?;
    if criteria_ids.is_empty() {
        return Ok(SliceOutcome::NothingMatched);
    }
    debug!(count = criteria_ids.len(), "slicing criteria resolved");

    let dg_options = options.dg_options.clone().normalized();

    // the graphs own no borrows of the module, so the analyses can be
    // dropped before the cut mutates it
    let mut sdg = {
        let index = ModuleIndex::new(module);
        let analyses = build_dependence_graph(module, &index, &dg_options)?;
        analyses.sdg
    };

    let criteria_nodes: Vec<SDGNodeId> = criteria_ids
        .iter()
        .filter_map(|id| sdg.node_of_instr(*id))
        .collect();
    if criteria_nodes.is_empty() {
        // matched instructions sit in functions the graph never reached
        return Ok(SliceOutcome::NothingMatched);
    }

    let mut slicer = Slicer::new(
        options.preserved_functions.iter().cloned(),
        options.forward_slicing,
        options.remove_slicing_criteria,
    );
    let slice_id = slicer.mark(&mut sdg, &criteria_nodes);
    let stats = slicer.slice(module, &mut sdg, slice_id);

    let verification_errors = verify_module(module);
    if verification_errors.is_empty() {
        info!(
            removed = stats.nodes_removed,
            total = stats.nodes_total,
            "slicing finished"
        );
    }

    Ok(SliceOutcome::Sliced {
        stats,
        verification_errors,
    })
}
