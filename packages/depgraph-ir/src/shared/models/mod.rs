//! Shared data model: the IR the engine analyses, plus module-wide
//! lookup tables.

pub mod index;
pub mod ir;

pub use index::{InstrLoc, ModuleIndex};
pub use ir::{
    Block, BlockId, DebugLoc, Function, FunctionId, Global, GlobalId, Instruction, Module, Opcode,
    Param, Type, Value, ValueId,
};
