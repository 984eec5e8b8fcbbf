//! Built-in thread-region analysis.
//!
//! One region per spawned thread routine (with its transitive callees)
//! plus one for the main thread; may-happen-in-parallel is
//! over-approximated as "every other region". Precise happens-before
//! reasoning belongs to an external analysis behind the `ThreadRegions`
//! port.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::features::points_to::ports::PointsToQuery;
use crate::shared::adt::SetQueue;
use crate::shared::models::{FunctionId, Module, Opcode, Value, ValueId};

use super::super::ports::{ThreadRegionId, ThreadRegions};

#[derive(Debug, Default)]
struct Region {
    instructions: Vec<ValueId>,
}

#[derive(Debug, Default)]
pub struct ThreadRegionAnalysis {
    regions: Vec<Region>,
    forks: Vec<ValueId>,
    joins: Vec<ValueId>,
    locks: Vec<ValueId>,
    /// Fork site -> routines it spawns.
    spawned: FxHashMap<ValueId, Vec<FunctionId>>,
    /// Lock site -> (critical-section instructions, unlock sites).
    sections: FxHashMap<ValueId, (Vec<ValueId>, Vec<ValueId>)>,
}

impl ThreadRegionAnalysis {
    pub fn compute<P: PointsToQuery>(
        module: &Module,
        pta: &P,
        entry_function: &str,
    ) -> Self {
        let mut analysis = ThreadRegionAnalysis::default();

        // synchronisation call sites and spawned routines
        for func in &module.functions {
            for block in &func.blocks {
                for instr in &block.instructions {
                    let Opcode::Call { callee, args, .. } = &instr.op else {
                        continue;
                    };
                    let name = match callee {
                        Value::Function(fid) => module
                            .function(*fid)
                            .map(|f| f.name.as_str())
                            .unwrap_or(""),
                        _ => "",
                    };
                    match name {
                        "pthread_create" => {
                            analysis.forks.push(instr.id);
                            let mut routines = Vec::new();
                            if let Some(routine) = args.get(2) {
                                if let Value::Function(fid) = routine {
                                    routines.push(*fid);
                                }
                                for fid in pta.functions_pointed_by(*routine) {
                                    if !routines.contains(&fid) {
                                        routines.push(fid);
                                    }
                                }
                            }
                            analysis.spawned.insert(instr.id, routines);
                        }
                        "pthread_join" => analysis.joins.push(instr.id),
                        "pthread_mutex_lock" => analysis.locks.push(instr.id),
                        _ => {}
                    }
                }
            }
        }

        // one region per spawned routine, one for the main thread
        let spawned_roots: FxHashSet<FunctionId> = analysis
            .spawned
            .values()
            .flat_map(|fs| fs.iter().copied())
            .collect();

        let main_root = module.function_by_name(entry_function).map(|f| f.id);
        if let Some(root) = main_root {
            analysis.regions.push(Region {
                instructions: reachable_instructions(module, root),
            });
        }
        for &root in &spawned_roots {
            analysis.regions.push(Region {
                instructions: reachable_instructions(module, root),
            });
        }

        analysis.collect_critical_sections(module);

        debug!(
            regions = analysis.regions.len(),
            forks = analysis.forks.len(),
            joins = analysis.joins.len(),
            "thread regions computed"
        );
        analysis
    }

    fn collect_critical_sections(&mut self, module: &Module) {
        let locks = self.locks.clone();
        for lock in locks {
            let Some((func, start_block, start_idx)) = find_instruction(module, lock) else {
                continue;
            };
            let func = module.function(func).expect("function of lock site");

            let mut section = Vec::new();
            let mut unlocks = Vec::new();
            let mut queue: SetQueue<(u32, usize)> = SetQueue::new();
            queue.push((start_block.0, start_idx + 1));

            while let Some((bid, idx)) = queue.pop() {
                let Some(block) = func.block(crate::shared::models::BlockId(bid)) else {
                    continue;
                };
                let mut fell_through = true;
                for instr in &block.instructions[idx..] {
                    if let Opcode::Call { callee, .. } = &instr.op {
                        if let Value::Function(fid) = callee {
                            let name = module
                                .function(*fid)
                                .map(|f| f.name.as_str())
                                .unwrap_or("");
                            if name == "pthread_mutex_unlock" {
                                unlocks.push(instr.id);
                                fell_through = false;
                                break;
                            }
                        }
                    }
                    section.push(instr.id);
                }
                if fell_through {
                    for succ in block.successors() {
                        queue.push((succ.0, 0));
                    }
                }
            }

            self.sections.insert(lock, (section, unlocks));
        }
    }
}

/// Instructions of `root` and every function reachable from it through
/// direct calls.
fn reachable_instructions(module: &Module, root: FunctionId) -> Vec<ValueId> {
    let mut instructions = Vec::new();
    let mut queue: SetQueue<FunctionId> = SetQueue::new();
    queue.push(root);

    while let Some(fid) = queue.pop() {
        let Some(func) = module.function(fid) else {
            continue;
        };
        for block in &func.blocks {
            for instr in &block.instructions {
                instructions.push(instr.id);
                if let Opcode::Call {
                    callee: Value::Function(callee),
                    ..
                } = &instr.op
                {
                    queue.push(*callee);
                }
            }
        }
    }
    instructions
}

fn find_instruction(
    module: &Module,
    id: ValueId,
) -> Option<(FunctionId, crate::shared::models::BlockId, usize)> {
    for func in &module.functions {
        for block in &func.blocks {
            if let Some(idx) = block.instructions.iter().position(|i| i.id == id) {
                return Some((func.id, block.id, idx));
            }
        }
    }
    None
}

impl ThreadRegions for ThreadRegionAnalysis {
    fn regions(&self) -> Vec<ThreadRegionId> {
        (0..self.regions.len() as u32).map(ThreadRegionId).collect()
    }

    fn instructions_of(&self, region: ThreadRegionId) -> &[ValueId] {
        self.regions
            .get(region.0 as usize)
            .map(|r| r.instructions.as_slice())
            .unwrap_or(&[])
    }

    fn parallel_regions(&self, region: ThreadRegionId) -> Vec<ThreadRegionId> {
        // over-approximation: everything else may run in parallel
        (0..self.regions.len() as u32)
            .map(ThreadRegionId)
            .filter(|r| *r != region)
            .collect()
    }

    fn forks(&self) -> &[ValueId] {
        &self.forks
    }

    fn joins(&self) -> &[ValueId] {
        &self.joins
    }

    fn corresponding_forks(&self, _join: ValueId) -> Vec<ValueId> {
        // which fork a join waits for needs happens-before reasoning;
        // every fork may correspond
        self.forks.clone()
    }

    fn joined_functions(&self, join: ValueId) -> Vec<FunctionId> {
        let mut functions = Vec::new();
        for fork in self.corresponding_forks(join) {
            if let Some(routines) = self.spawned.get(&fork) {
                for &f in routines {
                    if !functions.contains(&f) {
                        functions.push(f);
                    }
                }
            }
        }
        functions
    }

    fn locks(&self) -> &[ValueId] {
        &self.locks
    }

    fn corresponding_unlocks(&self, lock: ValueId) -> Vec<ValueId> {
        self.sections
            .get(&lock)
            .map(|(_, unlocks)| unlocks.clone())
            .unwrap_or_default()
    }

    fn critical_section_of(&self, lock: ValueId) -> Vec<ValueId> {
        self.sections
            .get(&lock)
            .map(|(section, _)| section.clone())
            .unwrap_or_default()
    }
}
