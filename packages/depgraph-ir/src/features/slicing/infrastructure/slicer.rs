//! The two-phase slicer: mark what the criteria depend on, then cut the
//! rest out of the module while repairing the basic-block structure so
//! the result stays well formed.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::features::sdg::domain::{SDGBlockId, SDGNodeId, Sdg, ARTIFICIAL_LABEL, DEP_KINDS};
use crate::shared::adt::SetQueue;
use crate::shared::models::{
    Block, BlockId, FunctionId, Instruction, Module, Opcode, Type, Value, ValueId,
};

#[derive(Debug, Clone, Default)]
pub struct SliceStats {
    pub nodes_total: usize,
    pub nodes_removed: usize,
    pub blocks_removed: usize,
    pub functions_sliced: usize,
}

pub struct Slicer {
    preserved: FxHashSet<String>,
    forward: bool,
    remove_criteria: bool,
    last_slice_id: u32,
}

impl Slicer {
    pub fn new(preserved: impl IntoIterator<Item = String>, forward: bool, remove_criteria: bool) -> Self {
        Slicer {
            preserved: preserved.into_iter().collect(),
            forward,
            remove_criteria,
            last_slice_id: 0,
        }
    }

    /// Phase 1: flood the dependence edges from the criteria and stamp
    /// every reached node with a fresh slice id.
    ///
    /// A backward walk is context aware in the Horwitz-Reps-Binkley
    /// manner: the first pass stays in the criteria's functions and
    /// their callers, deferring steps that descend into callees; the
    /// second pass descends but never climbs back out through call
    /// edges, so sibling call sites of a shared callee stay out of the
    /// slice. Thread forks are exempt: a spawned routine's fork site is
    /// always reachable.
    pub fn mark(&mut self, sdg: &mut Sdg, criteria: &[SDGNodeId]) -> u32 {
        self.last_slice_id += 1;
        let slice_id = self.last_slice_id;

        let criteria_set: FxHashSet<SDGNodeId> = criteria.iter().copied().collect();
        let mut reached_again: FxHashSet<SDGNodeId> = FxHashSet::default();

        if self.forward {
            let mut queue: SetQueue<SDGNodeId> = SetQueue::new();
            for &c in criteria {
                queue.push(c);
            }
            while let Some(node) = queue.pop() {
                sdg.node_mut(node).slice_mark = slice_id;
                for kind in DEP_KINDS {
                    for next in sdg.node(node).deps.of(kind).to_vec() {
                        if criteria_set.contains(&next) {
                            reached_again.insert(next);
                        }
                        queue.push(next);
                    }
                }
            }
        } else {
            let mut deferred: Vec<SDGNodeId> = Vec::new();

            // pass 1: everything except descents into callees
            let mut queue: SetQueue<SDGNodeId> = SetQueue::new();
            for &c in criteria {
                queue.push(c);
            }
            while let Some(node) = queue.pop() {
                sdg.node_mut(node).slice_mark = slice_id;
                let fu = sdg.node(node).function;
                for kind in DEP_KINDS {
                    for next in sdg.node(node).rev.of(kind).to_vec() {
                        if criteria_set.contains(&next) {
                            reached_again.insert(next);
                        }
                        if descends(sdg, fu, sdg.node(next).function) {
                            deferred.push(next);
                        } else {
                            queue.push(next);
                        }
                    }
                }
            }

            // pass 2: into the callees, without climbing back out
            let mut queue: SetQueue<SDGNodeId> = SetQueue::new();
            for node in deferred {
                queue.push(node);
            }
            while let Some(node) = queue.pop() {
                sdg.node_mut(node).slice_mark = slice_id;
                let fu = sdg.node(node).function;
                for kind in DEP_KINDS {
                    for next in sdg.node(node).rev.of(kind).to_vec() {
                        if criteria_set.contains(&next) {
                            reached_again.insert(next);
                        }
                        if ascends(sdg, fu, sdg.node(next).function) {
                            continue;
                        }
                        queue.push(next);
                    }
                }
            }
        }

        if self.remove_criteria {
            // criteria that nothing in the slice depends on go away too
            for &c in criteria {
                if !reached_again.contains(&c) {
                    sdg.node_mut(c).slice_mark = 0;
                }
            }
        }

        slice_id
    }

    /// Phase 2: cut every function's unmarked blocks and instructions
    /// and repair the CFG.
    pub fn slice(&self, module: &mut Module, sdg: &mut Sdg, slice_id: u32) -> SliceStats {
        let mut stats = SliceStats::default();
        let (mut next_val, mut next_blk) = module.next_ids();

        for fid in sdg.function_ids() {
            let Some(func) = module.function(fid) else {
                continue;
            };
            if func.is_declaration() || self.preserved.contains(&func.name) {
                continue;
            }
            self.slice_function(
                module,
                sdg,
                fid,
                slice_id,
                &mut next_val,
                &mut next_blk,
                &mut stats,
            );
            stats.functions_sliced += 1;
        }

        debug!(
            removed = stats.nodes_removed,
            total = stats.nodes_total,
            "slice cut finished"
        );
        stats
    }

    #[allow(clippy::too_many_arguments)]
    fn slice_function(
        &self,
        module: &mut Module,
        sdg: &mut Sdg,
        fid: FunctionId,
        slice_id: u32,
        next_val: &mut u32,
        next_blk: &mut u32,
        stats: &mut SliceStats,
    ) {
        let Some(fsdg) = sdg.function(fid) else {
            return;
        };
        let blocks = fsdg.blocks.clone();
        let old_exit = fsdg.exit_block;

        // every instruction id the function owns before the cut; used to
        // undef-replace uses of whatever gets removed
        let pre_slice_ids: FxHashSet<ValueId> = module
            .function(fid)
            .map(|f| {
                f.blocks
                    .iter()
                    .flat_map(|b| b.instructions.iter().map(|i| i.id))
                    .collect()
            })
            .unwrap_or_default();

        // ---- remove blocks whose nodes are all unmarked
        let mut removed_blocks: FxHashSet<SDGBlockId> = FxHashSet::default();
        for &sb in &blocks {
            let Some(ir_block) = sdg.block(sb).ir_block else {
                continue;
            };
            let keep = sdg.block(sb).nodes.iter().any(|n| {
                sdg.node(*n).slice_mark == slice_id
            });
            if keep {
                continue;
            }

            // phis in the surviving successors lose this incoming block
            for edge in sdg.block(sb).successors.clone() {
                if edge.label == ARTIFICIAL_LABEL || edge.target == sb {
                    continue;
                }
                if let Some(succ_ir) = sdg.block(edge.target).ir_block {
                    remove_phi_incoming(module, fid, succ_ir, ir_block);
                }
            }
            detach_block(sdg, sb);
            removed_blocks.insert(sb);
            stats.blocks_removed += 1;
        }
        if !removed_blocks.is_empty() {
            let removed_ir: FxHashSet<BlockId> = removed_blocks
                .iter()
                .filter_map(|b| sdg.block(*b).ir_block)
                .collect();
            if let Some(func) = module.function_mut(fid) {
                func.blocks.retain(|b| !removed_ir.contains(&b.id));
            }
        }

        let surviving: Vec<SDGBlockId> = blocks
            .iter()
            .copied()
            .filter(|b| !removed_blocks.contains(b) && sdg.block(*b).ir_block.is_some())
            .collect();

        // ---- reconnect the block structure
        let mut new_exit: Option<SDGBlockId> = None;
        for &sb in &surviving {
            if sdg.block(sb).successors_num() == 0 {
                continue;
            }
            let term_kept = sdg
                .block(sb)
                .last_node()
                .map(|n| sdg.node(n).slice_mark == slice_id)
                .unwrap_or(false);

            // a removed conditional branch with a self-loop: the loop
            // edge has no meaning any more, drop it
            if sdg.block(sb).successors_num() == 2
                && !term_kept
                && !sdg.block(sb).successors_are_same()
            {
                sdg.block_mut(sb).remove_successors_to(sb);
            }

            // a removed terminator with one successor: an unconditional
            // jump under label 0
            if sdg.block(sb).successors_num() == 1 && !term_kept {
                let mut edge = *sdg
                    .block(sb)
                    .real_successors()
                    .next()
                    .expect("one successor");
                edge.label = 0;
                if Some(edge.target) == old_exit {
                    let exit = self.ensure_safe_exit(
                        module, sdg, fid, &mut new_exit, slice_id, next_val, next_blk,
                    );
                    edge.target = exit;
                }
                sdg.block_mut(sb).remove_real_successors();
                sdg.block_mut(sb).add_successor(edge.target, edge.label);
                continue;
            }

            // fill in the labels lost with removed target blocks, so the
            // labels stay contiguous; missing ones jump to the safe exit
            let arity = sdg
                .block(sb)
                .ir_block
                .and_then(|ib| module.function(fid).and_then(|f| f.block(ib)))
                .map(|b| b.successors().len())
                .unwrap_or(0);
            let labels: FxHashSet<u8> = sdg
                .block(sb)
                .real_successors()
                .filter(|e| Some(e.target) != old_exit)
                .map(|e| e.label)
                .collect();
            for label in 0..arity.min(usize::from(ARTIFICIAL_LABEL)) as u8 {
                if !labels.contains(&label) {
                    let exit = self.ensure_safe_exit(
                        module, sdg, fid, &mut new_exit, slice_id, next_val, next_blk,
                    );
                    sdg.block_mut(sb).add_successor(exit, label);
                }
            }
            if new_exit.is_some() {
                if let Some(old) = old_exit {
                    sdg.block_mut(sb).remove_successors_to(old);
                }
            }

            // all successors equal: one unconditional jump
            if sdg.block(sb).successors_num() > 1 && sdg.block(sb).successors_are_same() {
                let target = sdg
                    .block(sb)
                    .real_successors()
                    .next()
                    .expect("has successors")
                    .target;
                sdg.block_mut(sb).remove_real_successors();
                sdg.block_mut(sb).add_successor(target, 0);
            }
        }

        // ---- remove unmarked instructions from the surviving blocks
        let keep_ids: FxHashSet<ValueId> = {
            let mut keep = FxHashSet::default();
            if let Some(func) = module.function(fid) {
                for block in &func.blocks {
                    for instr in &block.instructions {
                        stats.nodes_total += 1;
                        let marked = sdg
                            .node_of_instr(instr.id)
                            .map(|n| sdg.node(n).slice_mark == slice_id)
                            .unwrap_or(true);
                        // terminator semantics that must survive slicing
                        let essential =
                            matches!(instr.op, Opcode::Ret { .. } | Opcode::Unreachable);
                        if marked || essential {
                            keep.insert(instr.id);
                        } else {
                            stats.nodes_removed += 1;
                        }
                    }
                }
            }
            keep
        };
        let mut dropped_nodes: Vec<SDGNodeId> = Vec::new();
        if let Some(func) = module.function_mut(fid) {
            for block in &mut func.blocks {
                block.instructions.retain(|i| {
                    if keep_ids.contains(&i.id) {
                        true
                    } else {
                        if let Some(node) = sdg.node_of_instr(i.id) {
                            dropped_nodes.push(node);
                        }
                        false
                    }
                });
            }
        }
        for node in dropped_nodes {
            sdg.remove_node_edges(node);
        }

        // sliced-away values leave undef behind in surviving uses
        if let Some(func) = module.function_mut(fid) {
            let surviving_ids: FxHashSet<ValueId> = func
                .blocks
                .iter()
                .flat_map(|b| b.instructions.iter().map(|i| i.id))
                .collect();
            for block in &mut func.blocks {
                for instr in &mut block.instructions {
                    replace_removed_uses(instr, &pre_slice_ids, &surviving_ids);
                }
            }
        }

        // ---- rewrite the terminators from the repaired block edges
        self.reconnect_blocks(module, sdg, fid, &surviving, next_val);

        // ---- a sliced-away entry may leave the new entry block with
        // predecessors, which the IR does not allow
        ensure_entry_block(module, fid, next_val, next_blk);

        // ---- phi lists must match the surviving predecessors
        fix_phi_incomings(module, fid);
    }

    /// The safe-exit block: one `ret` with 0 for main, void for void
    /// functions, poison otherwise.
    #[allow(clippy::too_many_arguments)]
    fn ensure_safe_exit(
        &self,
        module: &mut Module,
        sdg: &mut Sdg,
        fid: FunctionId,
        new_exit: &mut Option<SDGBlockId>,
        slice_id: u32,
        next_val: &mut u32,
        next_blk: &mut u32,
    ) -> SDGBlockId {
        if let Some(existing) = *new_exit {
            return existing;
        }

        let ret_value = safe_return_value(module, fid);
        let ret_id = ValueId(*next_val);
        *next_val += 1;
        let block_id = BlockId(*next_blk);
        *next_blk += 1;

        if let Some(func) = module.function_mut(fid) {
            func.blocks.push(Block {
                id: block_id,
                name: "safe_return".to_string(),
                instructions: vec![Instruction {
                    id: ret_id,
                    op: Opcode::Ret { value: ret_value },
                    debug_loc: None,
                }],
            });
        }

        let sb = sdg.create_block(fid, Some(block_id));
        let node = sdg.create_node(crate::features::sdg::domain::SDGNodeKind::Instruction(ret_id));
        sdg.node_mut(node).slice_mark = slice_id;
        sdg.node_mut(node).function = Some(fid);
        sdg.append_node(sb, node);
        if let Some(fsdg) = sdg.function_mut(fid) {
            fsdg.blocks.push(sb);
            fsdg.exit_block = Some(sb);
        }

        *new_exit = Some(sb);
        sb
    }

    /// Rewrite (or synthesise) each block's terminator so the IR matches
    /// the repaired successor edges.
    fn reconnect_blocks(
        &self,
        module: &mut Module,
        sdg: &Sdg,
        fid: FunctionId,
        surviving: &[SDGBlockId],
        next_val: &mut u32,
    ) {
        let is_main = module
            .function(fid)
            .map(|f| f.name == "main")
            .unwrap_or(false);
        let return_type = module
            .function(fid)
            .map(|f| f.return_type)
            .unwrap_or(Type::Void);

        for &sb in surviving {
            let Some(ir_block) = sdg.block(sb).ir_block else {
                continue;
            };
            let edges: Vec<(SDGBlockId, u8)> = sdg
                .block(sb)
                .real_successors()
                .map(|e| (e.target, e.label))
                .collect();
            let edge_targets: Vec<(u8, BlockId)> = edges
                .iter()
                .filter_map(|(t, l)| sdg.block(*t).ir_block.map(|ib| (*l, ib)))
                .collect();

            let Some(func) = module.function_mut(fid) else {
                continue;
            };
            let Some(block) = func.block_mut(ir_block) else {
                continue;
            };

            let has_terminator = block
                .instructions
                .last()
                .map(|i| i.is_terminator())
                .unwrap_or(false);

            if !has_terminator {
                if edge_targets.len() == 1 && edge_targets[0].0 != ARTIFICIAL_LABEL {
                    block.instructions.push(Instruction {
                        id: ValueId(*next_val),
                        op: Opcode::Br {
                            target: edge_targets[0].1,
                        },
                        debug_loc: None,
                    });
                } else {
                    // no way on: return safely
                    let value = if return_type.is_void() {
                        None
                    } else if is_main {
                        Some(Value::ConstInt(0))
                    } else {
                        Some(Value::Undef)
                    };
                    block.instructions.push(Instruction {
                        id: ValueId(*next_val),
                        op: Opcode::Ret { value },
                        debug_loc: None,
                    });
                }
                *next_val += 1;
                continue;
            }

            // terminator survived: point its labels at the (possibly
            // rerouted) targets
            if let Some(term) = block.instructions.last_mut() {
                for (label, target) in edge_targets {
                    set_successor(term, label, target);
                }
            }
        }
    }
}

/// Does a backward step from a node in `from` to a dependency in `to`
/// descend into a callee?
fn descends(sdg: &Sdg, from: Option<FunctionId>, to: Option<FunctionId>) -> bool {
    match (from, to) {
        (Some(a), Some(b)) if a != b => sdg.calls(a, b) && !sdg.calls(b, a),
        _ => false,
    }
}

/// Does a backward step from a node in `from` to a dependency in `to`
/// climb out into a caller? Fork relationships never block the climb:
/// the spawning site must stay reachable from the thread's body.
fn ascends(sdg: &Sdg, from: Option<FunctionId>, to: Option<FunctionId>) -> bool {
    match (from, to) {
        (Some(a), Some(b)) if a != b => {
            sdg.calls(b, a) && !sdg.calls(a, b) && !sdg.forks(b, a)
        }
        _ => false,
    }
}

/// The value a synthesised return gives back.
fn safe_return_value(module: &Module, fid: FunctionId) -> Option<Value> {
    let func = module.function(fid)?;
    if func.return_type.is_void() {
        None
    } else if func.name == "main" {
        Some(Value::ConstInt(0))
    } else {
        Some(Value::Undef)
    }
}

fn set_successor(term: &mut Instruction, label: u8, target: BlockId) {
    match &mut term.op {
        Opcode::Br { target: t } => {
            if label == 0 {
                *t = target;
            }
        }
        Opcode::CondBr {
            if_true, if_false, ..
        } => match label {
            0 => *if_true = target,
            1 => *if_false = target,
            _ => {}
        },
        Opcode::Switch { default, cases, .. } => {
            if label == 0 {
                *default = target;
            } else if let Some((_, t)) = cases.get_mut(usize::from(label) - 1) {
                *t = target;
            }
        }
        _ => {}
    }
}

/// Replace uses of removed instructions by undef, the way the original
/// values are dropped before erasing a node.
fn replace_removed_uses(
    instr: &mut Instruction,
    pre_slice: &FxHashSet<ValueId>,
    surviving: &FxHashSet<ValueId>,
) {
    let gone = |v: &mut Value| {
        if let Value::Instr(id) = v {
            if pre_slice.contains(id) && !surviving.contains(id) {
                *v = Value::Undef;
            }
        }
    };

    match &mut instr.op {
        Opcode::Alloca { count, .. } => {
            if let Some(c) = count {
                gone(c);
            }
        }
        Opcode::Store { value, ptr, .. } => {
            gone(value);
            gone(ptr);
        }
        Opcode::Load { ptr, .. } | Opcode::Gep { ptr, .. } => gone(ptr),
        Opcode::Cast { value, .. } | Opcode::DbgValue { value } => gone(value),
        Opcode::Phi { incoming, .. } => {
            for (v, _) in incoming {
                gone(v);
            }
        }
        Opcode::Call { callee, args, .. } => {
            gone(callee);
            for arg in args {
                gone(arg);
            }
        }
        Opcode::Ret { value } => {
            if let Some(v) = value {
                gone(v);
            }
        }
        Opcode::CondBr { cond, .. } | Opcode::Switch { cond, .. } => gone(cond),
        Opcode::Binary { lhs, rhs, .. } | Opcode::Cmp { lhs, rhs } => {
            gone(lhs);
            gone(rhs);
        }
        Opcode::DbgDeclare { addr } => gone(addr),
        Opcode::Br { .. } | Opcode::Unreachable => {}
    }
}

/// Drop `pred`'s incoming values from every phi in `block`.
fn remove_phi_incoming(module: &mut Module, fid: FunctionId, block: BlockId, pred: BlockId) {
    let Some(func) = module.function_mut(fid) else {
        return;
    };
    let Some(block) = func.block_mut(block) else {
        return;
    };
    for instr in &mut block.instructions {
        if let Opcode::Phi { incoming, .. } = &mut instr.op {
            incoming.retain(|(_, b)| *b != pred);
        } else {
            // phis sit at the front of a block
            break;
        }
    }
}

/// Detach a block from the SDG block structure.
fn detach_block(sdg: &mut Sdg, block: SDGBlockId) {
    let preds = sdg.block(block).predecessors.clone();
    for pred in preds {
        sdg.block_mut(pred).remove_successors_to(block);
    }
    let succs: Vec<SDGBlockId> = sdg.block(block).successors.iter().map(|e| e.target).collect();
    for succ in succs {
        sdg.block_mut(succ).predecessors.retain(|p| *p != block);
    }
    sdg.block_mut(block).successors.clear();
    sdg.block_mut(block).predecessors.clear();
}

/// If the entry block ended up with predecessors, wrap it with a fresh
/// block that just jumps to it.
fn ensure_entry_block(module: &mut Module, fid: FunctionId, next_val: &mut u32, next_blk: &mut u32) {
    let Some(func) = module.function(fid) else {
        return;
    };
    if func.blocks.is_empty() {
        return;
    }
    let entry = func.blocks[0].id;
    let has_preds = func
        .blocks
        .iter()
        .any(|b| b.successors().contains(&entry));
    if !has_preds {
        return;
    }

    let block_id = BlockId(*next_blk);
    *next_blk += 1;
    let br_id = ValueId(*next_val);
    *next_val += 1;

    if let Some(func) = module.function_mut(fid) {
        func.blocks.insert(
            0,
            Block {
                id: block_id,
                name: "single_entry".to_string(),
                instructions: vec![Instruction {
                    id: br_id,
                    op: Opcode::Br { target: entry },
                    debug_loc: None,
                }],
            },
        );
    }
}

/// Align every phi's incoming list with the block's actual predecessors.
fn fix_phi_incomings(module: &mut Module, fid: FunctionId) {
    let Some(func) = module.function(fid) else {
        return;
    };
    let mut preds: FxHashMap<BlockId, FxHashSet<BlockId>> = FxHashMap::default();
    for block in &func.blocks {
        for succ in block.successors() {
            preds.entry(succ).or_default().insert(block.id);
        }
    }
    let block_ids: Vec<BlockId> = func.blocks.iter().map(|b| b.id).collect();

    let Some(func) = module.function_mut(fid) else {
        return;
    };
    for bid in block_ids {
        let pred_set = preds.get(&bid).cloned().unwrap_or_default();
        let Some(block) = func.block_mut(bid) else {
            continue;
        };
        for instr in &mut block.instructions {
            if let Opcode::Phi { incoming, .. } = &mut instr.op {
                incoming.retain(|(_, b)| pred_set.contains(b));
            } else {
                break;
            }
        }
    }
}
