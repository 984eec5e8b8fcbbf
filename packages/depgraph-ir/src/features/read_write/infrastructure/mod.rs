pub mod builder;
pub mod models;

pub use builder::{BuiltReadWriteGraph, ReadWriteGraphBuilder};
pub use models::{FunctionModel, ModelInterval, ModelOffset};
