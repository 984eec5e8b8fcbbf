//! Test helper: a small fluent builder for IR modules.

#![allow(dead_code)]

use depgraph_ir::shared::models::{
    Block, BlockId, DebugLoc, Function, FunctionId, Global, GlobalId, Instruction, Module, Opcode,
    Param, Type, Value, ValueId,
};

#[derive(Default)]
pub struct ModuleBuilder {
    globals: Vec<Global>,
    functions: Vec<Function>,
    next_value: u32,
    next_block: u32,
    next_global: u32,
    next_function: u32,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        ModuleBuilder::default()
    }

    pub fn global(&mut self, name: &str, size: u64) -> Value {
        let id = GlobalId(self.next_global);
        self.next_global += 1;
        self.globals.push(Global {
            id,
            name: name.to_string(),
            size,
            is_constant: false,
            initializer_points_to: Vec::new(),
        });
        Value::Global(id)
    }

    pub fn global_pointing_to(&mut self, name: &str, size: u64, targets: Vec<Value>) -> Value {
        let value = self.global(name, size);
        if let Value::Global(id) = value {
            self.globals
                .iter_mut()
                .find(|g| g.id == id)
                .expect("just added")
                .initializer_points_to = targets;
        }
        value
    }

    pub fn declare(&mut self, name: &str, params: Vec<Type>, return_type: Type) -> Value {
        let id = FunctionId(self.next_function);
        self.next_function += 1;
        let params = params
            .into_iter()
            .map(|ty| {
                let id = ValueId(self.next_value);
                self.next_value += 1;
                Param { id, ty }
            })
            .collect();
        self.functions.push(Function {
            id,
            name: name.to_string(),
            params,
            return_type,
            is_variadic: false,
            blocks: Vec::new(),
        });
        Value::Function(id)
    }

    pub fn function(&mut self, name: &str, params: Vec<Type>, return_type: Type) -> FunctionBuilder {
        let value = self.declare(name, params, return_type);
        let Value::Function(id) = value else {
            unreachable!()
        };
        let mut fb = FunctionBuilder {
            module: self,
            function: id,
            blocks: Vec::new(),
            current: 0,
        };
        let entry = fb.new_block();
        fb.select(entry);
        fb
    }

    pub fn build(self) -> Module {
        Module {
            globals: self.globals,
            functions: self.functions,
        }
    }

    fn fresh_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    fn fresh_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }
}

pub struct FunctionBuilder<'m> {
    module: &'m mut ModuleBuilder,
    function: FunctionId,
    blocks: Vec<Block>,
    current: usize,
}

impl<'m> FunctionBuilder<'m> {
    /// The function itself as a value (for direct calls and fn pointers).
    pub fn value(&self) -> Value {
        Value::Function(self.function)
    }

    pub fn param(&self, index: usize) -> Value {
        let func = self
            .module
            .functions
            .iter()
            .find(|f| f.id == self.function)
            .expect("function exists");
        Value::Instr(func.params[index].id)
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = self.module.fresh_block();
        self.blocks.push(Block {
            id,
            name: format!("b{}", id.0),
            instructions: Vec::new(),
        });
        id
    }

    pub fn select(&mut self, block: BlockId) {
        self.current = self
            .blocks
            .iter()
            .position(|b| b.id == block)
            .expect("block created by this builder");
    }

    fn push(&mut self, op: Opcode) -> Value {
        let id = self.module.fresh_value();
        self.blocks[self.current].instructions.push(Instruction {
            id,
            op,
            debug_loc: None,
        });
        Value::Instr(id)
    }

    /// Attach a source location to the last pushed instruction.
    pub fn at(&mut self, line: u32, col: u32) -> &mut Self {
        if let Some(instr) = self.blocks[self.current].instructions.last_mut() {
            instr.debug_loc = Some(DebugLoc { line, col });
        }
        self
    }

    pub fn alloca(&mut self, size: u64) -> Value {
        self.push(Opcode::Alloca {
            elem_size: size,
            count: None,
        })
    }

    pub fn store(&mut self, value: Value, ptr: Value, size: u64) -> Value {
        self.push(Opcode::Store { value, ptr, size })
    }

    pub fn load(&mut self, ptr: Value, ty: Type) -> Value {
        self.push(Opcode::Load { ptr, ty })
    }

    pub fn gep(&mut self, ptr: Value, offset: Option<u64>) -> Value {
        self.push(Opcode::Gep { ptr, offset })
    }

    pub fn cast(&mut self, value: Value, ty: Type) -> Value {
        self.push(Opcode::Cast { value, ty })
    }

    pub fn phi(&mut self, ty: Type, incoming: Vec<(Value, BlockId)>) -> Value {
        self.push(Opcode::Phi { ty, incoming })
    }

    pub fn call(&mut self, callee: Value, args: Vec<Value>, ret_ty: Type) -> Value {
        self.push(Opcode::Call {
            callee,
            args,
            ret_ty,
        })
    }

    pub fn cmp(&mut self, lhs: Value, rhs: Value) -> Value {
        self.push(Opcode::Cmp { lhs, rhs })
    }

    pub fn binary(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.push(Opcode::Binary { ty, lhs, rhs })
    }

    pub fn ret(&mut self, value: Option<Value>) -> Value {
        self.push(Opcode::Ret { value })
    }

    pub fn br(&mut self, target: BlockId) -> Value {
        self.push(Opcode::Br { target })
    }

    pub fn cond_br(&mut self, cond: Value, if_true: BlockId, if_false: BlockId) -> Value {
        self.push(Opcode::CondBr {
            cond,
            if_true,
            if_false,
        })
    }

    pub fn unreachable(&mut self) -> Value {
        self.push(Opcode::Unreachable)
    }

    pub fn finish(self) {
        let function = self.function;
        let blocks = self.blocks;
        let func = self
            .module
            .functions
            .iter_mut()
            .find(|f| f.id == function)
            .expect("function exists");
        func.blocks = blocks;
    }
}

/// All instruction ids surviving in a function, by opcode name, for
/// compact assertions.
pub fn opcode_names(module: &Module, function: &str) -> Vec<&'static str> {
    let func = module.function_by_name(function).expect("function exists");
    let mut names = Vec::new();
    for block in &func.blocks {
        for instr in &block.instructions {
            names.push(match &instr.op {
                Opcode::Alloca { .. } => "alloca",
                Opcode::Store { .. } => "store",
                Opcode::Load { .. } => "load",
                Opcode::Gep { .. } => "gep",
                Opcode::Cast { .. } => "cast",
                Opcode::Phi { .. } => "phi",
                Opcode::Call { .. } => "call",
                Opcode::Ret { .. } => "ret",
                Opcode::Br { .. } => "br",
                Opcode::CondBr { .. } => "condbr",
                Opcode::Switch { .. } => "switch",
                Opcode::Unreachable => "unreachable",
                Opcode::Binary { .. } => "binary",
                Opcode::Cmp { .. } => "cmp",
                Opcode::DbgDeclare { .. } => "dbg.declare",
                Opcode::DbgValue { .. } => "dbg.value",
            });
        }
    }
    names
}

/// Does any surviving instruction have this id?
pub fn has_instruction(module: &Module, id: Value) -> bool {
    let Value::Instr(id) = id else { return false };
    module.functions.iter().any(|f| {
        f.blocks
            .iter()
            .any(|b| b.instructions.iter().any(|i| i.id == id))
    })
}
