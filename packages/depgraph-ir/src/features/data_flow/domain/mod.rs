pub mod definitions;

pub use definitions::{DefEntry, DefinitionsMap};
