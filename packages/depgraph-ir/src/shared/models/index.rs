//! Module-wide lookup tables.
//!
//! Built once per analysis over an immutable `Module`; every component
//! that needs to go from a `ValueId` back to its instruction (or from a
//! block to its function) shares this index instead of re-scanning the
//! module.

use rustc_hash::FxHashMap;

use super::ir::{Block, BlockId, Function, FunctionId, GlobalId, Instruction, Module, Type, Value, ValueId};

/// Where an instruction lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrLoc {
    pub function: FunctionId,
    pub block: BlockId,
    /// Position of the instruction within its block.
    pub index: usize,
}

#[derive(Debug)]
pub struct ModuleIndex<'m> {
    module: &'m Module,
    instr_locs: FxHashMap<ValueId, InstrLoc>,
    param_owners: FxHashMap<ValueId, FunctionId>,
    block_owners: FxHashMap<BlockId, FunctionId>,
    block_preds: FxHashMap<BlockId, Vec<BlockId>>,
    functions_by_name: FxHashMap<&'m str, FunctionId>,
}

impl<'m> ModuleIndex<'m> {
    pub fn new(module: &'m Module) -> Self {
        let mut instr_locs = FxHashMap::default();
        let mut param_owners = FxHashMap::default();
        let mut block_owners = FxHashMap::default();
        let mut block_preds: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        let mut functions_by_name = FxHashMap::default();

        for func in &module.functions {
            functions_by_name.insert(func.name.as_str(), func.id);
            for p in &func.params {
                param_owners.insert(p.id, func.id);
            }
            for block in &func.blocks {
                block_owners.insert(block.id, func.id);
                for (index, instr) in block.instructions.iter().enumerate() {
                    instr_locs.insert(
                        instr.id,
                        InstrLoc {
                            function: func.id,
                            block: block.id,
                            index,
                        },
                    );
                }
                for succ in block.successors() {
                    block_preds.entry(succ).or_default().push(block.id);
                }
            }
        }

        ModuleIndex {
            module,
            instr_locs,
            param_owners,
            block_owners,
            block_preds,
            functions_by_name,
        }
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn instruction(&self, id: ValueId) -> Option<&'m Instruction> {
        let loc = self.instr_locs.get(&id)?;
        let func = self.module.function(loc.function)?;
        let block = func.block(loc.block)?;
        block.instructions.get(loc.index)
    }

    pub fn location(&self, id: ValueId) -> Option<InstrLoc> {
        self.instr_locs.get(&id).copied()
    }

    pub fn function_of_value(&self, id: ValueId) -> Option<FunctionId> {
        self.instr_locs
            .get(&id)
            .map(|l| l.function)
            .or_else(|| self.param_owners.get(&id).copied())
    }

    pub fn function_of_block(&self, id: BlockId) -> Option<FunctionId> {
        self.block_owners.get(&id).copied()
    }

    pub fn block(&self, id: BlockId) -> Option<&'m Block> {
        let func = self.module.function(self.function_of_block(id)?)?;
        func.block(id)
    }

    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        self.block_preds.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn function_id(&self, name: &str) -> Option<FunctionId> {
        self.functions_by_name.get(name).copied()
    }

    pub fn function(&self, id: FunctionId) -> Option<&'m Function> {
        self.module.function(id)
    }

    pub fn is_param(&self, id: ValueId) -> bool {
        self.param_owners.contains_key(&id)
    }

    /// Coarse type of a value in operand position.
    pub fn type_of(&self, value: Value) -> Type {
        match value {
            Value::Instr(id) => {
                if let Some(instr) = self.instruction(id) {
                    instr.result_type()
                } else if let Some(fid) = self.param_owners.get(&id) {
                    self.module
                        .function(*fid)
                        .and_then(|f| f.params.iter().find(|p| p.id == id))
                        .map(|p| p.ty)
                        .unwrap_or(Type::Ptr)
                } else {
                    Type::Ptr
                }
            }
            Value::Global(_) | Value::Function(_) | Value::Null => Type::Ptr,
            Value::ConstInt(_) => Type::Int(64),
            Value::Undef => Type::Int(64),
        }
    }

    /// The directly called function of a call instruction, if the callee
    /// operand is a plain function constant.
    pub fn direct_callee(&self, callee: Value) -> Option<&'m Function> {
        match callee {
            Value::Function(fid) => self.module.function(fid),
            _ => None,
        }
    }

    /// Argument types of a call, for the call-compat check.
    pub fn arg_types(&self, args: &[Value]) -> Vec<Type> {
        args.iter().map(|a| self.type_of(*a)).collect()
    }

    pub fn global_name(&self, id: GlobalId) -> &'m str {
        self.module
            .global(id)
            .map(|g| g.name.as_str())
            .unwrap_or("<unknown global>")
    }
}
