//! Classic control dependence via post-dominators
//! (Ferrante-Ottenstein-Warren, with the post-dominator tree computed by
//! the Cooper-Harvey-Kennedy iteration petgraph implements).

use petgraph::graph::NodeIndex;
use petgraph::visit::Reversed;
use petgraph::algo::dominators;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::shared::models::BlockId;

use super::cfg::FunctionCfg;

/// Block-level control dependencies: dependent block -> the blocks whose
/// branches control it.
pub type BlockDeps = FxHashMap<BlockId, FxHashSet<BlockId>>;

pub fn classic_control_dependencies(cfg: &FunctionCfg) -> BlockDeps {
    let mut deps: BlockDeps = FxHashMap::default();

    // post-dominators = dominators of the reversed CFG rooted at exit
    let pdom = dominators::simple_fast(Reversed(&cfg.graph), cfg.exit);
    let ipdom = |n: NodeIndex| pdom.immediate_dominator(n);

    // for every edge a -> b where b does not post-dominate a, every node
    // on the post-dominator path from b up to (excluding) ipdom(a) is
    // control dependent on a
    let edges: Vec<(NodeIndex, NodeIndex)> = cfg
        .graph
        .edge_indices()
        .filter_map(|e| cfg.graph.edge_endpoints(e))
        .collect();

    for (a, b) in edges {
        let Some(stop) = ipdom(a) else {
            continue; // a is unreachable from the exit
        };
        let Some(controller) = cfg.block_of(a) else {
            continue;
        };

        let mut runner = Some(b);
        while let Some(current) = runner {
            if current == stop {
                break;
            }
            if let Some(block) = cfg.block_of(current) {
                deps.entry(block).or_default().insert(controller);
            }
            runner = ipdom(current);
        }
    }

    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{
        Block, BlockId, Function, FunctionId, Instruction, Opcode, Type, Value, ValueId,
    };

    fn inst(id: u32, op: Opcode) -> Instruction {
        Instruction {
            id: ValueId(id),
            op,
            debug_loc: None,
        }
    }

    /// entry: br cond b1, b2; b1 -> b3; b2 -> b3; b3: ret
    fn diamond() -> Function {
        Function {
            id: FunctionId(0),
            name: "f".into(),
            params: Vec::new(),
            return_type: Type::Void,
            is_variadic: false,
            blocks: vec![
                Block {
                    id: BlockId(0),
                    name: "entry".into(),
                    instructions: vec![inst(
                        0,
                        Opcode::CondBr {
                            cond: Value::ConstInt(1),
                            if_true: BlockId(1),
                            if_false: BlockId(2),
                        },
                    )],
                },
                Block {
                    id: BlockId(1),
                    name: "then".into(),
                    instructions: vec![inst(1, Opcode::Br { target: BlockId(3) })],
                },
                Block {
                    id: BlockId(2),
                    name: "else".into(),
                    instructions: vec![inst(2, Opcode::Br { target: BlockId(3) })],
                },
                Block {
                    id: BlockId(3),
                    name: "join".into(),
                    instructions: vec![inst(3, Opcode::Ret { value: None })],
                },
            ],
        }
    }

    #[test]
    fn branch_controls_its_arms_but_not_the_join() {
        let func = diamond();
        let cfg = FunctionCfg::new(&func);
        let deps = classic_control_dependencies(&cfg);

        assert!(deps[&BlockId(1)].contains(&BlockId(0)));
        assert!(deps[&BlockId(2)].contains(&BlockId(0)));
        assert!(!deps.contains_key(&BlockId(3)));
    }

    #[test]
    fn loop_header_depends_on_itself() {
        // entry -> header; header: cond br body, out; body -> header
        let func = Function {
            id: FunctionId(0),
            name: "f".into(),
            params: Vec::new(),
            return_type: Type::Void,
            is_variadic: false,
            blocks: vec![
                Block {
                    id: BlockId(0),
                    name: "entry".into(),
                    instructions: vec![inst(0, Opcode::Br { target: BlockId(1) })],
                },
                Block {
                    id: BlockId(1),
                    name: "header".into(),
                    instructions: vec![inst(
                        1,
                        Opcode::CondBr {
                            cond: Value::ConstInt(1),
                            if_true: BlockId(2),
                            if_false: BlockId(3),
                        },
                    )],
                },
                Block {
                    id: BlockId(2),
                    name: "body".into(),
                    instructions: vec![inst(2, Opcode::Br { target: BlockId(1) })],
                },
                Block {
                    id: BlockId(3),
                    name: "out".into(),
                    instructions: vec![inst(3, Opcode::Ret { value: None })],
                },
            ],
        };
        let cfg = FunctionCfg::new(&func);
        let deps = classic_control_dependencies(&cfg);

        assert!(deps[&BlockId(2)].contains(&BlockId(1)));
        assert!(deps[&BlockId(1)].contains(&BlockId(1)));
    }
}
