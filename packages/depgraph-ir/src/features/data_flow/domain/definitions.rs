//! Definition maps: which nodes last wrote which byte intervals of which
//! targets. The dataflow fact of the reaching-definitions engine and the
//! per-block cache of the memory-SSA engine.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::features::read_write::domain::{RWNodeId, RW_UNKNOWN_MEMORY};
use crate::shared::offset::OffsetInterval;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefEntry {
    pub interval: OffsetInterval,
    pub defs: FxHashSet<RWNodeId>,
}

/// `target -> interval -> defining nodes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionsMap {
    entries: FxHashMap<RWNodeId, Vec<DefEntry>>,
}

impl DefinitionsMap {
    pub fn new() -> Self {
        DefinitionsMap::default()
    }

    /// Record that `def` wrote `target[interval]`.
    pub fn add(&mut self, target: RWNodeId, interval: OffsetInterval, def: RWNodeId) -> bool {
        let entries = self.entries.entry(target).or_default();
        if let Some(entry) = entries.iter_mut().find(|e| e.interval == interval) {
            return entry.defs.insert(def);
        }
        let mut defs = FxHashSet::default();
        defs.insert(def);
        entries.push(DefEntry { interval, defs });
        true
    }

    /// A strong update: drop every definition whose bytes are entirely
    /// covered by `interval`.
    pub fn kill_covered(&mut self, target: RWNodeId, interval: &OffsetInterval) {
        if let Some(entries) = self.entries.get_mut(&target) {
            entries.retain(|e| !interval.covers(&e.interval));
            if entries.is_empty() {
                self.entries.remove(&target);
            }
        }
    }

    /// Every definition that may have written some byte of
    /// `target[interval]`. Writes through unknown pointers define every
    /// target; a read through an unknown pointer reads every target.
    pub fn overlapping(&self, target: RWNodeId, interval: &OffsetInterval) -> FxHashSet<RWNodeId> {
        let mut result = FxHashSet::default();

        if target == RW_UNKNOWN_MEMORY {
            for entries in self.entries.values() {
                for entry in entries {
                    result.extend(entry.defs.iter().copied());
                }
            }
            return result;
        }

        if let Some(entries) = self.entries.get(&target) {
            for entry in entries {
                if entry.interval.overlaps(interval) {
                    result.extend(entry.defs.iter().copied());
                }
            }
        }
        // stores through unknown pointers may have hit this target too
        if let Some(entries) = self.entries.get(&RW_UNKNOWN_MEMORY) {
            for entry in entries {
                result.extend(entry.defs.iter().copied());
            }
        }
        result
    }

    /// Union `other` into `self`; returns whether anything was added.
    pub fn merge(&mut self, other: &DefinitionsMap) -> bool {
        let mut changed = false;
        for (target, entries) in &other.entries {
            for entry in entries {
                for def in &entry.defs {
                    changed |= self.add(*target, entry.interval, *def);
                }
            }
        }
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = (&RWNodeId, &Vec<DefEntry>)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::offset::Offset;

    fn iv(start: u64, len: u64) -> OffsetInterval {
        OffsetInterval::new(Offset::new(start), Offset::new(len))
    }

    #[test]
    fn strong_update_kills_covered_entries() {
        let mut map = DefinitionsMap::new();
        let target = RWNodeId(10);
        map.add(target, iv(0, 4), RWNodeId(1));
        map.add(target, iv(4, 4), RWNodeId(2));

        map.kill_covered(target, &iv(0, 4));
        map.add(target, iv(0, 4), RWNodeId(3));

        let defs = map.overlapping(target, &iv(0, 4));
        assert!(defs.contains(&RWNodeId(3)));
        assert!(!defs.contains(&RWNodeId(1)));
        assert!(!defs.contains(&RWNodeId(2)));

        let defs = map.overlapping(target, &iv(4, 4));
        assert!(defs.contains(&RWNodeId(2)));
    }

    #[test]
    fn unknown_writes_reach_every_target() {
        let mut map = DefinitionsMap::new();
        map.add(RW_UNKNOWN_MEMORY, OffsetInterval::whole(), RWNodeId(7));

        let defs = map.overlapping(RWNodeId(42), &iv(0, 4));
        assert!(defs.contains(&RWNodeId(7)));
    }

    #[test]
    fn unknown_reads_see_every_write() {
        let mut map = DefinitionsMap::new();
        map.add(RWNodeId(10), iv(0, 4), RWNodeId(1));
        map.add(RWNodeId(11), iv(8, 4), RWNodeId(2));

        let defs = map.overlapping(RW_UNKNOWN_MEMORY, &OffsetInterval::whole());
        assert_eq!(defs.len(), 2);
    }

    #[test]
    fn merge_reports_growth() {
        let mut a = DefinitionsMap::new();
        a.add(RWNodeId(10), iv(0, 4), RWNodeId(1));

        let mut b = DefinitionsMap::new();
        b.add(RWNodeId(10), iv(0, 4), RWNodeId(1));
        assert!(!a.merge(&b));

        b.add(RWNodeId(10), iv(0, 4), RWNodeId(2));
        assert!(a.merge(&b));
    }
}
