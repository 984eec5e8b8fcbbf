//! Shared foundations: the IR model, the offset lattice, worklist
//! containers and the graph dumpers.

pub mod adt;
pub mod dump;
pub mod models;
pub mod offset;
