//! Non-termination sensitive control dependence (NTSCD).
//!
//! A node n is NTSCD-dependent on a branch p when some successor of p
//! commits every maximal path to n while another successor admits a
//! maximal path (possibly infinite) that avoids n. Unlike the classic
//! post-dominance construction, a loop that may spin forever makes the
//! code after it dependent on the loop condition.
//!
//! Three algorithms compute the relation:
//! - `ntscd`: inevitability sets per node (greatest-fixpoint funnels).
//! - `ntscd2`: on-demand per-branch checks (avoidability by deleted-node
//!   reachability), same relation.
//! - `ntscd_ranganath`: the original worklist formulation of Ranganath
//!   et al.; kept as published.
//!
//! # References
//! - Ranganath et al. "A New Foundation for Control Dependence and Slicing
//!   for Modern Program Structures" (TOPLAS 2007)

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use rustc_hash::{FxHashMap, FxHashSet};

use super::cfg::FunctionCfg;
use super::post_dominance::BlockDeps;

/// Nodes from which every maximal path contains `target`. Greatest-
/// fixpoint funnel: a node joins when it has successors and all of them
/// already funnel into the set; sinks and cycles avoiding `target` never
/// join.
fn inevitable_from(cfg: &FunctionCfg, target: NodeIndex) -> FxHashSet<NodeIndex> {
    let mut set = FxHashSet::default();
    set.insert(target);

    loop {
        let mut grew = false;
        for node in cfg.graph.node_indices() {
            if set.contains(&node) {
                continue;
            }
            let mut succs = cfg.graph.neighbors(node).peekable();
            if succs.peek().is_none() {
                continue;
            }
            if cfg.graph.neighbors(node).all(|s| set.contains(&s)) {
                set.insert(node);
                grew = true;
            }
        }
        if !grew {
            return set;
        }
    }
}

/// NTSCD via inevitability sets.
pub fn ntscd(cfg: &FunctionCfg) -> BlockDeps {
    let mut deps: BlockDeps = FxHashMap::default();
    let branches = cfg.branches();
    if branches.is_empty() {
        return deps;
    }

    for candidate in cfg.graph.node_indices() {
        let Some(dependent) = cfg.block_of(candidate) else {
            continue;
        };
        let inevitable = inevitable_from(cfg, candidate);

        for &branch in &branches {
            let Some(controller) = cfg.block_of(branch) else {
                continue;
            };
            let mut committed = false;
            let mut avoidable = false;
            for succ in cfg.graph.neighbors(branch) {
                if inevitable.contains(&succ) {
                    committed = true;
                } else {
                    avoidable = true;
                }
            }
            if committed && avoidable {
                deps.entry(dependent).or_default().insert(controller);
            }
        }
    }

    deps
}

/// Can a maximal path from `start` avoid `banned`? A maximal path either
/// ends at a sink or is infinite, so with `banned` deleted the question
/// is whether the reachable region contains a true sink or a cycle.
fn maximal_path_avoids(cfg: &FunctionCfg, start: NodeIndex, banned: NodeIndex) -> bool {
    if start == banned {
        return false;
    }

    // region reachable from start without entering banned
    let mut region = FxHashSet::default();
    region.insert(start);
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        for succ in cfg.graph.neighbors(node) {
            if succ != banned && region.insert(succ) {
                stack.push(succ);
            }
        }
    }

    // a path may end at a genuine sink (no successors at all); a node
    // whose only successors are banned forces any maximal extension
    // through banned and does not count
    if region
        .iter()
        .any(|&n| cfg.graph.neighbors(n).next().is_none())
    {
        return true;
    }

    // otherwise only an infinite path helps: look for a cycle in the
    // induced region (Kahn's algorithm leaves cyclic nodes unprocessed)
    let mut indegree: FxHashMap<NodeIndex, usize> =
        region.iter().map(|&n| (n, 0usize)).collect();
    for &node in &region {
        for succ in cfg.graph.neighbors(node) {
            if succ != banned && region.contains(&succ) {
                *indegree.get_mut(&succ).expect("region member") += 1;
            }
        }
    }
    let mut queue: Vec<NodeIndex> = indegree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&n, _)| n)
        .collect();
    let mut processed = 0usize;
    while let Some(node) = queue.pop() {
        processed += 1;
        for succ in cfg.graph.neighbors(node) {
            if succ == banned || !region.contains(&succ) {
                continue;
            }
            let d = indegree.get_mut(&succ).expect("region member");
            *d -= 1;
            if *d == 0 {
                queue.push(succ);
            }
        }
    }

    processed < region.len()
}

/// NTSCD via on-demand avoidability checks; the same relation as
/// `ntscd`, computed branch by branch.
pub fn ntscd2(cfg: &FunctionCfg) -> BlockDeps {
    let mut deps: BlockDeps = FxHashMap::default();

    for branch in cfg.branches() {
        let Some(controller) = cfg.block_of(branch) else {
            continue;
        };
        let succs: Vec<NodeIndex> = cfg.graph.neighbors(branch).collect();

        for candidate in cfg.graph.node_indices() {
            let Some(dependent) = cfg.block_of(candidate) else {
                continue;
            };
            let mut committed = false;
            let mut avoidable = false;
            for &succ in &succs {
                if succ == candidate || !maximal_path_avoids(cfg, succ, candidate) {
                    committed = true;
                } else {
                    avoidable = true;
                }
            }
            if committed && avoidable {
                deps.entry(dependent).or_default().insert(controller);
            }
        }
    }

    deps
}

/// The original worklist algorithm of Ranganath et al. Every node
/// accumulates the set of branch edges that "reach" it; a branch edge
/// set propagates through a branch only once it is fully resolved. A
/// node depends on a branch when it has seen some but not all of the
/// branch's edges.
pub fn ntscd_ranganath(cfg: &FunctionCfg) -> BlockDeps {
    type EdgeId = (NodeIndex, usize);

    let branches = cfg.branches();
    let mut out_degree: FxHashMap<NodeIndex, usize> = FxHashMap::default();
    for &b in &branches {
        out_degree.insert(b, cfg.graph.neighbors(b).count());
    }

    let mut smap: FxHashMap<NodeIndex, FxHashSet<EdgeId>> = FxHashMap::default();
    let mut worklist: Vec<NodeIndex> = Vec::new();

    for &branch in &branches {
        for (i, edge) in cfg.graph.edges(branch).enumerate() {
            let succ = edge.target();
            smap.entry(succ).or_default().insert((branch, i));
            worklist.push(succ);
        }
    }

    while let Some(node) = worklist.pop() {
        let current = smap.get(&node).cloned().unwrap_or_default();
        let succs: Vec<NodeIndex> = cfg.graph.neighbors(node).collect();

        // what propagates out of this node
        let outgoing: FxHashSet<EdgeId> = if succs.len() <= 1 {
            current.clone()
        } else {
            // through a branch only fully resolved edge sets flow
            current
                .iter()
                .copied()
                .filter(|(p, _)| {
                    let seen = current.iter().filter(|(q, _)| q == p).count();
                    seen == out_degree.get(p).copied().unwrap_or(usize::MAX)
                })
                .collect()
        };

        for succ in succs {
            let entry = smap.entry(succ).or_default();
            let before = entry.len();
            entry.extend(outgoing.iter().copied());
            if entry.len() > before {
                worklist.push(succ);
            }
        }
    }

    let mut deps: BlockDeps = FxHashMap::default();
    for (node, edges) in &smap {
        let Some(dependent) = cfg.block_of(*node) else {
            continue;
        };
        for &branch in &branches {
            let seen = edges.iter().filter(|(p, _)| *p == branch).count();
            let total = out_degree[&branch];
            if seen > 0 && seen < total {
                if let Some(controller) = cfg.block_of(branch) {
                    deps.entry(dependent).or_default().insert(controller);
                }
            }
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

    /// entry -> loop header; header: br body | after; body -> header;
    /// after: ret. The code after the loop is NTSCD-dependent on the
    /// header (the loop may spin forever), unlike in classic CD.
    fn looping() -> Function {
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
                    name: "after".into(),
                    instructions: vec![inst(3, Opcode::Ret { value: None })],
                },
            ],
        }
    }

    #[test]
    fn code_after_a_loop_depends_on_the_loop_condition() {
        let func = looping();
        let cfg = FunctionCfg::new(&func);

        for deps in [ntscd(&cfg), ntscd2(&cfg), ntscd_ranganath(&cfg)] {
            assert!(
                deps.get(&BlockId(3))
                    .map(|c| c.contains(&BlockId(1)))
                    .unwrap_or(false),
                "after-loop block must depend on the header"
            );
        }
    }

    #[test]
    fn ntscd_flavors_agree_on_a_diamond() {
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
        };
        let cfg = FunctionCfg::new(&func);

        let a = ntscd(&cfg);
        let b = ntscd2(&cfg);
        assert_eq!(a.get(&BlockId(1)), b.get(&BlockId(1)));
        assert_eq!(a.get(&BlockId(2)), b.get(&BlockId(2)));
        assert!(a.get(&BlockId(3)).is_none());
        assert!(b.get(&BlockId(3)).is_none());
    }
}
