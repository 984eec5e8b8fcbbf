//! Feature modules, one vertical slice per analysis stage:
//! points-to -> read/write graph -> data flow -> control deps ->
//! SDG assembly -> slicing, with thread regions on the side.

pub mod control_dep;
pub mod data_flow;
pub mod points_to;
pub mod read_write;
pub mod sdg;
pub mod slicing;
pub mod threads;
