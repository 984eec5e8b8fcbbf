//! Inclusion-based pointer analysis over the pointer graph.
//!
//! Three flavors share one fixpoint skeleton:
//! - **FI**: flow-insensitive, one points-to set and one memory object
//!   per allocation site (Andersen-style inclusion constraints).
//! - **FS**: flow-sensitive, memory maps at every program point joined
//!   by union at CFG merges.
//! - **FSInv**: FS plus lifetime invalidation for `free` and locals at
//!   return.
//!
//! # References
//! - Andersen, L. O. "Program Analysis and Specialization for C" (PhD 1994)
//! - Hind, M. "Pointer Analysis: Haven't We Solved This Problem Yet?" (PASTE 2001)

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use application::{AllocationKind, PTAOptions, PointerAnalysis, PtaFlavor};
pub use domain::{Pointer, PointsToSet};
pub use ports::{PointsToQuery, ResolvedPointer, ResolvedPointsTo};
