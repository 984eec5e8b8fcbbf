//! Interprocedural no-return analysis: which instructions may never let
//! execution continue past them.
//!
//! A call site is a no-return point when every path through the callee
//! misses a `ret` (directly or because the callee itself calls something
//! that never returns); an `unreachable` is a no-return point by itself.
//! The dependence-graph assembly turns these points into formal/actual
//! no-return sentinels.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::shared::models::{BlockId, Function, FunctionId, Module, Opcode, Value, ValueId};

/// Library functions that never return.
const NORETURN_NAMES: &[&str] = &["abort", "exit", "_exit", "_Exit", "llvm.trap", "__assert_fail"];

#[derive(Debug, Default)]
pub struct NoReturnAnalysis {
    can_return: FxHashMap<FunctionId, bool>,
}

impl NoReturnAnalysis {
    pub fn compute(module: &Module) -> Self {
        let mut analysis = NoReturnAnalysis::default();

        for func in &module.functions {
            let assumed = if func.is_declaration() {
                !NORETURN_NAMES.contains(&func.name.as_str())
            } else {
                // optimistically non-returning; grown by the fixpoint
                false
            };
            analysis.can_return.insert(func.id, assumed);
        }

        loop {
            let mut changed = false;
            for func in &module.functions {
                if func.is_declaration() || analysis.can_return[&func.id] {
                    continue;
                }
                if analysis.function_reaches_ret(func) {
                    analysis.can_return.insert(func.id, true);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        analysis
    }

    pub fn can_return(&self, function: FunctionId) -> bool {
        self.can_return.get(&function).copied().unwrap_or(true)
    }

    /// Is there a path from the entry to a `ret` that passes no
    /// no-return point?
    fn function_reaches_ret(&self, func: &Function) -> bool {
        let mut visited: FxHashSet<BlockId> = FxHashSet::default();
        let mut stack = vec![func.blocks[0].id];
        visited.insert(func.blocks[0].id);

        while let Some(bid) = stack.pop() {
            let Some(block) = func.block(bid) else {
                continue;
            };
            let mut cut = false;
            for instr in &block.instructions {
                match &instr.op {
                    Opcode::Ret { .. } => return true,
                    Opcode::Unreachable => {
                        cut = true;
                        break;
                    }
                    Opcode::Call { callee, .. } => {
                        if let Value::Function(fid) = callee {
                            if !self.can_return.get(fid).copied().unwrap_or(true) {
                                cut = true;
                                break;
                            }
                        }
                    }
                    _ => {}
                }
            }
            if cut {
                continue;
            }
            for succ in block.successors() {
                if visited.insert(succ) {
                    stack.push(succ);
                }
            }
        }

        false
    }

    /// The no-return points of one function: `unreachable` instructions
    /// and calls whose callee cannot return.
    pub fn no_return_points(&self, func: &Function) -> Vec<ValueId> {
        let mut points = Vec::new();
        for block in &func.blocks {
            for instr in &block.instructions {
                match &instr.op {
                    Opcode::Unreachable => points.push(instr.id),
                    Opcode::Call { callee, .. } => {
                        if let Value::Function(fid) = callee {
                            if !self.can_return.get(fid).copied().unwrap_or(true) {
                                points.push(instr.id);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Block, Instruction, Param, Type};

    fn inst(id: u32, op: Opcode) -> Instruction {
        Instruction {
            id: ValueId(id),
            op,
            debug_loc: None,
        }
    }

    #[test]
    fn noreturn_propagates_through_wrappers() {
        // die() { abort(); unreachable } ; f() { die(); ret }
        let module = Module {
            globals: Vec::new(),
            functions: vec![
                Function {
                    id: FunctionId(0),
                    name: "abort".into(),
                    params: Vec::new(),
                    return_type: Type::Void,
                    is_variadic: false,
                    blocks: Vec::new(),
                },
                Function {
                    id: FunctionId(1),
                    name: "die".into(),
                    params: Vec::new(),
                    return_type: Type::Void,
                    is_variadic: false,
                    blocks: vec![Block {
                        id: BlockId(0),
                        name: String::new(),
                        instructions: vec![
                            inst(
                                0,
                                Opcode::Call {
                                    callee: Value::Function(FunctionId(0)),
                                    args: Vec::new(),
                                    ret_ty: Type::Void,
                                },
                            ),
                            inst(1, Opcode::Unreachable),
                        ],
                    }],
                },
                Function {
                    id: FunctionId(2),
                    name: "f".into(),
                    params: vec![Param {
                        id: ValueId(10),
                        ty: Type::Int(32),
                    }],
                    return_type: Type::Void,
                    is_variadic: false,
                    blocks: vec![Block {
                        id: BlockId(1),
                        name: String::new(),
                        instructions: vec![
                            inst(
                                2,
                                Opcode::Call {
                                    callee: Value::Function(FunctionId(1)),
                                    args: Vec::new(),
                                    ret_ty: Type::Void,
                                },
                            ),
                            inst(3, Opcode::Ret { value: None }),
                        ],
                    }],
                },
            ],
        };

        let analysis = NoReturnAnalysis::compute(&module);
        assert!(!analysis.can_return(FunctionId(0)));
        assert!(!analysis.can_return(FunctionId(1)));
        // f's only path runs through die(), so f cannot return either
        assert!(!analysis.can_return(FunctionId(2)));

        let f = module.function(FunctionId(2)).unwrap();
        assert_eq!(analysis.no_return_points(f), vec![ValueId(2)]);
    }
}
