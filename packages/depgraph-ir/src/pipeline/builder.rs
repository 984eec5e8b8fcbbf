//! Orchestration of the analysis pipeline: pointer analysis, read/write
//! graph and data dependence, control dependence, thread regions, and
//! finally the SDG assembly, with per-phase timing.

use std::time::Instant;

use tracing::debug;

use crate::errors::{DepgraphError, Result};
use crate::features::control_dep::application::analysis::ControlDependenceAnalysis;
use crate::features::data_flow::application::analysis::DataDependenceAnalysis;
use crate::features::points_to::application::analyzer::PointerAnalysis;
use crate::features::sdg::domain::Sdg;
use crate::features::sdg::infrastructure::builder::SdgBuilder;
use crate::features::threads::infrastructure::regions::ThreadRegionAnalysis;
use crate::features::threads::ports::ThreadRegions;
use crate::shared::models::{Module, ModuleIndex};

use super::options::DgOptions;

/// Wall-clock milliseconds spent in each phase.
#[derive(Debug, Clone, Default)]
pub struct BuildStatistics {
    pub pta_ms: f64,
    pub dda_ms: f64,
    pub cd_ms: f64,
    pub threads_ms: f64,
    pub sdg_ms: f64,
}

/// Everything the pipeline produced; the graphs own no borrows of the
/// module except the pointer analysis itself.
pub struct Analyses<'m> {
    pub pta: PointerAnalysis<'m>,
    pub dda: DataDependenceAnalysis,
    pub cd: ControlDependenceAnalysis,
    pub threads: Option<ThreadRegionAnalysis>,
    pub sdg: Sdg,
    pub stats: BuildStatistics,
}

fn ms(from: Instant) -> f64 {
    from.elapsed().as_secs_f64() * 1000.0
}

/// Run the full pipeline over one module.
pub fn build_dependence_graph<'m>(
    module: &'m Module,
    index: &ModuleIndex<'m>,
    options: &DgOptions,
) -> Result<Analyses<'m>> {
    if options.pta.is_svf && options.threads {
        // threading needs the native pointer analysis
        return Err(DepgraphError::config(
            "threads=true cannot be combined with an SVF-delegated pointer analysis",
        ));
    }
    let entry = module
        .function_by_name(&options.entry_function)
        .ok_or_else(|| {
            DepgraphError::malformed(format!(
                "entry function '{}' not found",
                options.entry_function
            ))
        })?;
    if entry.is_declaration() {
        return Err(DepgraphError::malformed(format!(
            "entry function '{}' has no body",
            options.entry_function
        )));
    }

    let mut stats = BuildStatistics::default();

    let timer = Instant::now();
    let mut pta = PointerAnalysis::build(module, index, options.pta.clone())?;
    pta.run();
    stats.pta_ms = ms(timer);
    debug!(ms = stats.pta_ms, "pointer analysis done");

    let timer = Instant::now();
    let mut dda = DataDependenceAnalysis::build(
        module,
        index,
        &pta,
        options.dda.clone(),
        &options.entry_function,
    );
    dda.run();
    stats.dda_ms = ms(timer);
    debug!(ms = stats.dda_ms, "data dependence done");

    let timer = Instant::now();
    let cd = ControlDependenceAnalysis::compute(module, options.cd.clone());
    stats.cd_ms = ms(timer);
    debug!(ms = stats.cd_ms, "control dependence done");

    let timer = Instant::now();
    let threads = if options.threads {
        Some(ThreadRegionAnalysis::compute(
            module,
            &pta,
            &options.entry_function,
        ))
    } else {
        None
    };
    stats.threads_ms = ms(timer);

    let timer = Instant::now();
    let sdg = SdgBuilder::new(module, index, &pta).build(
        &mut dda,
        &cd,
        threads.as_ref(),
        entry.id,
    );
    stats.sdg_ms = ms(timer);
    debug!(ms = stats.sdg_ms, "dependence graph assembled");

    Ok(Analyses {
        pta,
        dda,
        cd,
        threads,
        sdg,
        stats,
    })
}

/// Assemble the SDG with an externally supplied thread-region analysis
/// instead of the built-in one.
pub fn build_with_thread_regions<'m, T: ThreadRegions>(
    module: &'m Module,
    index: &ModuleIndex<'m>,
    options: &DgOptions,
    regions: &T,
) -> Result<Sdg> {
    let mut pta = PointerAnalysis::build(module, index, options.pta.clone())?;
    pta.run();
    let mut dda = DataDependenceAnalysis::build(
        module,
        index,
        &pta,
        options.dda.clone(),
        &options.entry_function,
    );
    dda.run();
    let cd = ControlDependenceAnalysis::compute(module, options.cd.clone());
    let entry = module
        .function_by_name(&options.entry_function)
        .ok_or_else(|| DepgraphError::malformed("entry function not found"))?;

    Ok(SdgBuilder::new(module, index, &pta).build(&mut dda, &cd, Some(regions), entry.id))
}
