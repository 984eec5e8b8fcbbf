//! Structural verification of a module after slicing: every block
//! terminated, phi lists matching the predecessors, branch targets in
//! range. Failures are reported, never fixed here.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::shared::models::{BlockId, Module, Opcode};

/// Verify the module; returns the list of violations (empty = valid).
pub fn verify_module(module: &Module) -> Vec<String> {
    let mut errors = Vec::new();

    for func in &module.functions {
        if func.is_declaration() {
            continue;
        }

        let block_ids: FxHashSet<BlockId> = func.blocks.iter().map(|b| b.id).collect();
        let mut preds: FxHashMap<BlockId, FxHashSet<BlockId>> = FxHashMap::default();
        for block in &func.blocks {
            for succ in block.successors() {
                preds.entry(succ).or_default().insert(block.id);
            }
        }

        for block in &func.blocks {
            match block.terminator() {
                None => errors.push(format!(
                    "function '{}': block {:?} is not terminated",
                    func.name, block.id
                )),
                Some(term) => {
                    for succ in term.successors() {
                        if !block_ids.contains(&succ) {
                            errors.push(format!(
                                "function '{}': block {:?} branches to missing block {:?}",
                                func.name, block.id, succ
                            ));
                        }
                    }
                }
            }

            // terminators only at the end
            for instr in &block.instructions[..block.instructions.len().saturating_sub(1)] {
                if instr.is_terminator() {
                    errors.push(format!(
                        "function '{}': block {:?} has a terminator in the middle",
                        func.name, block.id
                    ));
                }
            }

            let pred_set = preds.get(&block.id).cloned().unwrap_or_default();
            for instr in &block.instructions {
                let Opcode::Phi { incoming, .. } = &instr.op else {
                    break;
                };
                let incoming_blocks: FxHashSet<BlockId> =
                    incoming.iter().map(|(_, b)| *b).collect();
                if incoming_blocks != pred_set {
                    errors.push(format!(
                        "function '{}': phi {:?} incoming blocks do not match predecessors",
                        func.name, instr.id
                    ));
                }
            }
        }

        // the entry block must have no predecessors
        if let Some(entry) = func.blocks.first() {
            if preds.get(&entry.id).map(|p| !p.is_empty()).unwrap_or(false) {
                errors.push(format!(
                    "function '{}': entry block has predecessors",
                    func.name
                ));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Block, Function, FunctionId, Instruction, Type, ValueId};

    #[test]
    fn an_unterminated_block_is_reported() {
        let module = Module {
            globals: Vec::new(),
            functions: vec![Function {
                id: FunctionId(0),
                name: "f".into(),
                params: Vec::new(),
                return_type: Type::Void,
                is_variadic: false,
                blocks: vec![Block {
                    id: BlockId(0),
                    name: String::new(),
                    instructions: vec![Instruction {
                        id: ValueId(0),
                        op: Opcode::Alloca {
                            elem_size: 4,
                            count: None,
                        },
                        debug_loc: None,
                    }],
                }],
            }],
        };
        let errors = verify_module(&module);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not terminated"));
    }

    #[test]
    fn a_wellformed_function_passes() {
        let module = Module {
            globals: Vec::new(),
            functions: vec![Function {
                id: FunctionId(0),
                name: "f".into(),
                params: Vec::new(),
                return_type: Type::Void,
                is_variadic: false,
                blocks: vec![Block {
                    id: BlockId(0),
                    name: String::new(),
                    instructions: vec![Instruction {
                        id: ValueId(0),
                        op: Opcode::Ret { value: None },
                        debug_loc: None,
                    }],
                }],
            }],
        };
        assert!(verify_module(&module).is_empty());
    }
}
