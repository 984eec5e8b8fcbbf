//! The control-dependence facade: per-function block-level dependencies
//! with the configured algorithm, plus the interprocedural no-return
//! information.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::shared::models::{BlockId, FunctionId, Module};

use super::super::infrastructure::cfg::FunctionCfg;
use super::super::infrastructure::interproc::NoReturnAnalysis;
use super::super::infrastructure::ntscd::{ntscd, ntscd2, ntscd_ranganath};
use super::super::infrastructure::post_dominance::{classic_control_dependencies, BlockDeps};
use super::options::{CDOptions, CdAlgorithm};

pub struct ControlDependenceAnalysis {
    options: CDOptions,
    per_function: FxHashMap<FunctionId, BlockDeps>,
    no_returns: Option<NoReturnAnalysis>,
}

impl ControlDependenceAnalysis {
    pub fn compute(module: &Module, options: CDOptions) -> Self {
        if options.algorithm == CdAlgorithm::NtscdLegacy {
            warn!("NTSCDLegacy requested; running NTSCD2 instead");
        }
        let algorithm = options.effective_algorithm();

        let mut per_function = FxHashMap::default();
        for func in &module.functions {
            if func.is_declaration() {
                continue;
            }
            let cfg = FunctionCfg::new(func);
            let deps = match algorithm {
                CdAlgorithm::Classic => classic_control_dependencies(&cfg),
                CdAlgorithm::Ntscd => ntscd(&cfg),
                CdAlgorithm::Ntscd2 | CdAlgorithm::NtscdLegacy => ntscd2(&cfg),
                CdAlgorithm::NtscdRanganath => ntscd_ranganath(&cfg),
            };
            per_function.insert(func.id, deps);
        }

        let no_returns = if options.interprocedural {
            Some(NoReturnAnalysis::compute(module))
        } else {
            None
        };

        ControlDependenceAnalysis {
            options,
            per_function,
            no_returns,
        }
    }

    pub fn options(&self) -> &CDOptions {
        &self.options
    }

    /// The blocks whose branches control `block`.
    pub fn controllers_of(&self, function: FunctionId, block: BlockId) -> Option<&FxHashSet<BlockId>> {
        self.per_function.get(&function)?.get(&block)
    }

    pub fn block_dependencies(&self, function: FunctionId) -> Option<&BlockDeps> {
        self.per_function.get(&function)
    }

    pub fn no_returns(&self) -> Option<&NoReturnAnalysis> {
        self.no_returns.as_ref()
    }
}
