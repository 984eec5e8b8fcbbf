//! Data-dependence analysis configuration.

use rustc_hash::FxHashMap;

use crate::features::read_write::infrastructure::models::FunctionModel;
use crate::shared::offset::Offset;

/// Which data-dependence engine runs over the read/write graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DdaFlavor {
    /// Classical iterative reaching definitions.
    #[default]
    ReachingDefinitions,
    /// Memory-SSA with lazy phi synthesis.
    MemorySsa,
}

impl DdaFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            DdaFlavor::ReachingDefinitions => "rd",
            DdaFlavor::MemorySsa => "ssa",
        }
    }
}

/// What calls to undefined functions do to memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndefinedFunsBehavior {
    pub pure: bool,
    pub read_any: bool,
    pub read_args: bool,
    pub write_any: bool,
    pub write_args: bool,
}

impl UndefinedFunsBehavior {
    /// Undefined functions may read and write through their arguments.
    pub fn args() -> Self {
        UndefinedFunsBehavior {
            pure: false,
            read_any: false,
            read_args: true,
            write_any: false,
            write_args: true,
        }
    }

    /// Undefined functions have no side effects at all.
    pub fn pure() -> Self {
        UndefinedFunsBehavior {
            pure: true,
            read_any: false,
            read_args: false,
            write_any: false,
            write_args: false,
        }
    }
}

impl Default for UndefinedFunsBehavior {
    fn default() -> Self {
        UndefinedFunsBehavior::args()
    }
}

#[derive(Debug, Clone)]
pub struct DDAOptions {
    pub flavor: DdaFlavor,
    /// Allow strong updates through pointers with unknown offsets. Off by
    /// default; turning it on is unsound for overlapping writes.
    pub strong_update_unknown: bool,
    /// Cap on tracked points-to set sizes when mapping pointers; sets
    /// larger than this collapse to unknown memory.
    pub max_set_size: Offset,
    pub threads: bool,
    pub undefined_funs: UndefinedFunsBehavior,
    pub function_models: FxHashMap<String, FunctionModel>,
    /// Emit overwrite-definitions for every local allocation at each
    /// return, so dead locals do not leak definitions out of a function.
    pub forget_locals_at_return: bool,
}

impl Default for DDAOptions {
    fn default() -> Self {
        DDAOptions {
            flavor: DdaFlavor::default(),
            strong_update_unknown: false,
            max_set_size: Offset::UNKNOWN,
            threads: false,
            undefined_funs: UndefinedFunsBehavior::default(),
            function_models: FunctionModel::default_models(),
            forget_locals_at_return: false,
        }
    }
}

impl DDAOptions {
    pub fn function_model(&self, name: &str) -> Option<&FunctionModel> {
        self.function_models.get(name)
    }
}
