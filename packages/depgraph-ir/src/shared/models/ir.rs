//! The in-memory LLVM-like module the analyses consume and the slicer
//! rewrites.
//!
//! Reading and writing real bitcode is an external concern; a `Module` is
//! handed to the engine already lowered, with byte sizes resolved (what
//! LLVM would take from its `DataLayout`). The model is serde-serializable
//! so the command-line tools can load modules from JSON.

use serde::{Deserialize, Serialize};

/// Identifier of an instruction result (and of the instruction itself).
/// Unique across the whole module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Identifier of a global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId(pub u32);

/// Identifier of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// Identifier of a basic block. Unique across the whole module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// An SSA value as it appears in operand position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Instr(ValueId),
    Global(GlobalId),
    Function(FunctionId),
    ConstInt(i64),
    Null,
    Undef,
}

impl Value {
    pub fn as_instr(&self) -> Option<ValueId> {
        match self {
            Value::Instr(id) => Some(*id),
            _ => None,
        }
    }

    pub fn const_int(&self) -> Option<i64> {
        match self {
            Value::ConstInt(c) => Some(*c),
            _ => None,
        }
    }
}

/// Coarse value types; enough for call compatibility and for synthesising
/// return values during slicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    Int(u32),
    Ptr,
    Float(u32),
    /// Aggregate of a known byte size.
    Agg(u64),
}

impl Type {
    pub fn byte_size(&self) -> u64 {
        match self {
            Type::Void => 0,
            Type::Int(bits) => u64::from((bits + 7) / 8),
            Type::Ptr => 8,
            Type::Float(bits) => u64::from((bits + 7) / 8),
            Type::Agg(size) => *size,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr)
    }

    /// Lossless-enough convertibility at call boundaries. Pointers and
    /// integers convert into each other, aggregates only match by size.
    pub fn compatible_with(&self, other: &Type) -> bool {
        use Type::*;
        match (self, other) {
            (Void, Void) => true,
            (Int(_) | Ptr, Int(_) | Ptr) => true,
            (Float(_), Float(_)) => true,
            (Agg(a), Agg(b)) => a == b,
            _ => false,
        }
    }
}

/// Source location carried over from debug metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DebugLoc {
    pub line: u32,
    pub col: u32,
}

/// What an instruction does. Sizes are in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Opcode {
    /// Stack allocation. `count` is the dynamic element count operand of
    /// an array alloca, if any.
    Alloca {
        elem_size: u64,
        count: Option<Value>,
    },
    Store {
        value: Value,
        ptr: Value,
        size: u64,
    },
    Load {
        ptr: Value,
        ty: Type,
    },
    /// Pointer arithmetic. `offset` is the folded constant byte offset,
    /// or `None` when an index is not a compile-time constant.
    Gep {
        ptr: Value,
        offset: Option<u64>,
    },
    /// Bitcast / ptrtoint / inttoptr; all treated as an offset-preserving
    /// reinterpretation.
    Cast {
        value: Value,
        ty: Type,
    },
    Phi {
        ty: Type,
        incoming: Vec<(Value, BlockId)>,
    },
    Call {
        callee: Value,
        args: Vec<Value>,
        ret_ty: Type,
    },
    Ret {
        value: Option<Value>,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Value,
        if_true: BlockId,
        if_false: BlockId,
    },
    Switch {
        cond: Value,
        default: BlockId,
        cases: Vec<(i64, BlockId)>,
    },
    Unreachable,
    Binary {
        ty: Type,
        lhs: Value,
        rhs: Value,
    },
    Cmp {
        lhs: Value,
        rhs: Value,
    },
    DbgDeclare {
        addr: Value,
    },
    DbgValue {
        value: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: ValueId,
    pub op: Opcode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_loc: Option<DebugLoc>,
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.op,
            Opcode::Ret { .. }
                | Opcode::Br { .. }
                | Opcode::CondBr { .. }
                | Opcode::Switch { .. }
                | Opcode::Unreachable
        )
    }

    /// Successor blocks in label order. A cond-br's label 0 is the true
    /// target, a switch's label 0 is the default target.
    pub fn successors(&self) -> Vec<BlockId> {
        match &self.op {
            Opcode::Br { target } => vec![*target],
            Opcode::CondBr {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            Opcode::Switch { default, cases, .. } => {
                let mut succs = vec![*default];
                succs.extend(cases.iter().map(|(_, b)| *b));
                succs
            }
            _ => Vec::new(),
        }
    }

    /// The type of the instruction's result value.
    pub fn result_type(&self) -> Type {
        match &self.op {
            Opcode::Alloca { .. } | Opcode::Gep { .. } => Type::Ptr,
            Opcode::Load { ty, .. } => *ty,
            Opcode::Cast { ty, .. } => *ty,
            Opcode::Phi { ty, .. } => *ty,
            Opcode::Call { ret_ty, .. } => *ret_ty,
            Opcode::Binary { ty, .. } => *ty,
            Opcode::Cmp { .. } => Type::Int(1),
            _ => Type::Void,
        }
    }

    /// Operand values, in operand order.
    pub fn operands(&self) -> Vec<Value> {
        match &self.op {
            Opcode::Alloca { count, .. } => count.iter().copied().collect(),
            Opcode::Store { value, ptr, .. } => vec![*value, *ptr],
            Opcode::Load { ptr, .. } => vec![*ptr],
            Opcode::Gep { ptr, .. } => vec![*ptr],
            Opcode::Cast { value, .. } => vec![*value],
            Opcode::Phi { incoming, .. } => incoming.iter().map(|(v, _)| *v).collect(),
            Opcode::Call { callee, args, .. } => {
                let mut ops = vec![*callee];
                ops.extend(args.iter().copied());
                ops
            }
            Opcode::Ret { value } => value.iter().copied().collect(),
            Opcode::CondBr { cond, .. } | Opcode::Switch { cond, .. } => vec![*cond],
            Opcode::Binary { lhs, rhs, .. } | Opcode::Cmp { lhs, rhs } => vec![*lhs, *rhs],
            Opcode::DbgDeclare { addr } => vec![*addr],
            Opcode::DbgValue { value } => vec![*value],
            Opcode::Br { .. } | Opcode::Unreachable => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    #[serde(default)]
    pub name: String,
    pub instructions: Vec<Instruction>,
}

impl Block {
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator().map(|t| t.successors()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub id: ValueId,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    #[serde(default)]
    pub is_variadic: bool,
    /// Empty for declarations.
    pub blocks: Vec<Block>,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn entry_block(&self) -> Option<&Block> {
        self.blocks.first()
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Global {
    pub id: GlobalId,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub is_constant: bool,
    /// Functions or globals the initializer makes this global point to
    /// (e.g. `void (*fp)(void) = &f;`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initializer_points_to: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn function_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.id == id)
    }

    pub fn global(&self, id: GlobalId) -> Option<&Global> {
        self.globals.iter().find(|g| g.id == id)
    }

    /// Fresh id allocators for slicer-synthesised values and blocks.
    pub fn next_ids(&self) -> (u32, u32) {
        let mut max_val = 0u32;
        let mut max_blk = 0u32;
        for f in &self.functions {
            for p in &f.params {
                max_val = max_val.max(p.id.0);
            }
            for b in &f.blocks {
                max_blk = max_blk.max(b.id.0);
                for i in &b.instructions {
                    max_val = max_val.max(i.id.0);
                }
            }
        }
        (max_val + 1, max_blk + 1)
    }

    /// Is a call with `args` of types `arg_tys` compatible with `callee`'s
    /// prototype? Pointer-integer interchange is allowed, strict type
    /// equality is not required.
    pub fn call_is_compatible(callee: &Function, arg_tys: &[Type]) -> bool {
        if callee.is_variadic {
            if arg_tys.len() < callee.params.len() {
                return false;
            }
        } else if arg_tys.len() != callee.params.len() {
            return false;
        }
        callee
            .params
            .iter()
            .zip(arg_tys.iter())
            .all(|(p, a)| p.ty.compatible_with(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(id: u32, op: Opcode) -> Instruction {
        Instruction {
            id: ValueId(id),
            op,
            debug_loc: None,
        }
    }

    #[test]
    fn successor_labels_follow_terminator_order() {
        let t = inst(
            1,
            Opcode::Switch {
                cond: Value::ConstInt(0),
                default: BlockId(9),
                cases: vec![(0, BlockId(2)), (1, BlockId(3))],
            },
        );
        assert_eq!(t.successors(), vec![BlockId(9), BlockId(2), BlockId(3)]);
    }

    #[test]
    fn call_compat_allows_ptr_int_interchange() {
        let callee = Function {
            id: FunctionId(0),
            name: "f".into(),
            params: vec![
                Param {
                    id: ValueId(100),
                    ty: Type::Ptr,
                },
                Param {
                    id: ValueId(101),
                    ty: Type::Int(32),
                },
            ],
            return_type: Type::Void,
            is_variadic: false,
            blocks: Vec::new(),
        };

        assert!(Module::call_is_compatible(
            &callee,
            &[Type::Int(64), Type::Ptr]
        ));
        assert!(!Module::call_is_compatible(&callee, &[Type::Ptr]));
        assert!(!Module::call_is_compatible(
            &callee,
            &[Type::Float(64), Type::Int(32)]
        ));
    }

    #[test]
    fn declaration_has_no_blocks() {
        let f = Function {
            id: FunctionId(1),
            name: "ext".into(),
            params: Vec::new(),
            return_type: Type::Void,
            is_variadic: false,
            blocks: Vec::new(),
        };
        assert!(f.is_declaration());
    }
}
