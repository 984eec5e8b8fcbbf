//! depgraph-ir: a static dependence-graph engine for LLVM-style IR.
//!
//! The pipeline turns a module into a system dependence graph (SDG) and
//! supports program slicing over it:
//!
//! - `features/points_to`: inclusion-based pointer analysis (FI / FS /
//!   FSInv) over a pointer graph;
//! - `features/read_write`: per-instruction def/use sites derived from
//!   the points-to sets;
//! - `features/data_flow`: reaching definitions or memory-SSA over the
//!   read/write graph;
//! - `features/control_dep`: classic and non-termination sensitive
//!   control dependence, interprocedural no-return propagation;
//! - `features/threads`: thread regions / may-happen-in-parallel behind
//!   a narrow port;
//! - `features/sdg`: the graph assembly;
//! - `features/slicing`: mark, cut, and CFG repair;
//! - `pipeline`: orchestration and the slicing driver.
//!
//! Reading and writing actual bitcode is out of scope; modules arrive as
//! the serde-serializable model in `shared::models`.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod errors;
pub mod features;
pub mod pipeline;
pub mod shared;

pub use errors::{DepgraphError, Result};
pub use pipeline::{run_slicer, DgOptions, SliceOutcome, SlicerOptions};
pub use shared::models::{Module, ModuleIndex};
