//! Slicing-criteria matching.
//!
//! Two formats are supported, several criteria separated by `;`:
//! - `line:col` or `function:line:col`, matched against debug locations
//!   (`col` 0 matches the whole line);
//! - legacy `function#block#n`, matched by position (block index and
//!   instruction index within the function).
//!
//! With `criteria_are_next_instr` the criterion denotes the instruction
//! following the matched one.

use tracing::warn;

use crate::errors::{DepgraphError, Result};
use crate::shared::models::{Module, ValueId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Criterion {
    Location {
        function: Option<String>,
        line: u32,
        col: u32,
    },
    Legacy {
        function: String,
        block: usize,
        index: usize,
    },
}

fn parse_location(spec: &str) -> Result<Criterion> {
    let parts: Vec<&str> = spec.split(':').collect();
    let bad = || {
        DepgraphError::config(format!(
            "invalid slicing criterion '{}': expected line:col or function:line:col",
            spec
        ))
    };
    match parts.as_slice() {
        [line, col] => Ok(Criterion::Location {
            function: None,
            line: line.parse().map_err(|_| bad())?,
            col: col.parse().map_err(|_| bad())?,
        }),
        [function, line, col] => Ok(Criterion::Location {
            function: Some((*function).to_string()),
            line: line.parse().map_err(|_| bad())?,
            col: col.parse().map_err(|_| bad())?,
        }),
        _ => Err(bad()),
    }
}

fn parse_legacy(spec: &str) -> Result<Criterion> {
    let parts: Vec<&str> = spec.split('#').collect();
    let bad = || {
        DepgraphError::config(format!(
            "invalid legacy slicing criterion '{}': expected function#block#n",
            spec
        ))
    };
    match parts.as_slice() {
        [function, block, index] => Ok(Criterion::Legacy {
            function: (*function).to_string(),
            block: block.parse().map_err(|_| bad())?,
            index: index.parse().map_err(|_| bad())?,
        }),
        _ => Err(bad()),
    }
}

/// Resolve the criteria strings to instruction ids.
pub fn resolve_criteria(
    module: &Module,
    criteria: &str,
    legacy_criteria: &str,
    criteria_are_next_instr: bool,
) -> Result<Vec<ValueId>> {
    let mut parsed = Vec::new();
    for spec in criteria.split(';').filter(|s| !s.trim().is_empty()) {
        parsed.push(parse_location(spec.trim())?);
    }
    for spec in legacy_criteria.split(';').filter(|s| !s.trim().is_empty()) {
        parsed.push(parse_legacy(spec.trim())?);
    }

    let mut matched = Vec::new();
    for criterion in &parsed {
        let hits = match_criterion(module, criterion);
        if hits.is_empty() {
            warn!(?criterion, "slicing criterion matched nothing");
        }
        matched.extend(hits);
    }

    if criteria_are_next_instr {
        matched = matched
            .into_iter()
            .filter_map(|id| next_instruction(module, id))
            .collect();
    }

    matched.sort();
    matched.dedup();
    Ok(matched)
}

fn match_criterion(module: &Module, criterion: &Criterion) -> Vec<ValueId> {
    let mut hits = Vec::new();
    match criterion {
        Criterion::Location {
            function,
            line,
            col,
        } => {
            for func in &module.functions {
                if let Some(name) = function {
                    if &func.name != name {
                        continue;
                    }
                }
                for block in &func.blocks {
                    for instr in &block.instructions {
                        let Some(loc) = instr.debug_loc else { continue };
                        if loc.line == *line && (*col == 0 || loc.col == *col) {
                            hits.push(instr.id);
                        }
                    }
                }
            }
        }
        Criterion::Legacy {
            function,
            block,
            index,
        } => {
            if let Some(func) = module.function_by_name(function) {
                if let Some(instr) = func
                    .blocks
                    .get(*block)
                    .and_then(|b| b.instructions.get(*index))
                {
                    hits.push(instr.id);
                }
            }
        }
    }
    hits
}

fn next_instruction(module: &Module, id: ValueId) -> Option<ValueId> {
    for func in &module.functions {
        for block in &func.blocks {
            if let Some(pos) = block.instructions.iter().position(|i| i.id == id) {
                return block.instructions.get(pos + 1).map(|i| i.id);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{
        Block, BlockId, DebugLoc, Function, FunctionId, Instruction, Opcode, Type,
    };

    fn module() -> Module {
        Module {
            globals: Vec::new(),
            functions: vec![Function {
                id: FunctionId(0),
                name: "main".into(),
                params: Vec::new(),
                return_type: Type::Int(32),
                is_variadic: false,
                blocks: vec![Block {
                    id: BlockId(0),
                    name: String::new(),
                    instructions: vec![
                        Instruction {
                            id: ValueId(1),
                            op: Opcode::Alloca {
                                elem_size: 4,
                                count: None,
                            },
                            debug_loc: Some(DebugLoc { line: 3, col: 7 }),
                        },
                        Instruction {
                            id: ValueId(2),
                            op: Opcode::Ret { value: None },
                            debug_loc: Some(DebugLoc { line: 4, col: 1 }),
                        },
                    ],
                }],
            }],
        }
    }

    #[test]
    fn line_col_criterion_matches_debug_locations() {
        let m = module();
        assert_eq!(
            resolve_criteria(&m, "3:7", "", false).unwrap(),
            vec![ValueId(1)]
        );
        assert_eq!(
            resolve_criteria(&m, "main:4:0", "", false).unwrap(),
            vec![ValueId(2)]
        );
        assert!(resolve_criteria(&m, "9:9", "", false).unwrap().is_empty());
    }

    #[test]
    fn legacy_criterion_matches_by_position() {
        let m = module();
        assert_eq!(
            resolve_criteria(&m, "", "main#0#1", false).unwrap(),
            vec![ValueId(2)]
        );
    }

    #[test]
    fn next_instr_mode_shifts_the_match() {
        let m = module();
        assert_eq!(
            resolve_criteria(&m, "3:7", "", true).unwrap(),
            vec![ValueId(2)]
        );
    }

    #[test]
    fn malformed_criteria_are_rejected() {
        let m = module();
        assert!(resolve_criteria(&m, "nonsense", "", false).is_err());
        assert!(resolve_criteria(&m, "", "main#x#0", false).is_err());
    }
}
