//! Flow-insensitive memory model: one memory object per allocation site,
//! unioned across all program points. Writes never kill anything.

use rustc_hash::FxHashMap;

use crate::shared::offset::Offset;

use super::super::application::options::PTAOptions;
use super::super::domain::{
    MemoryObject, PGNodeId, Pointer, PointerGraph, PointsToSet, UNKNOWN_MEMORY_ID,
};
use super::builder::BuiltPointerGraph;
use super::solver::{memory_site, preprocess_geps, MemoryModel};

#[derive(Debug, Default)]
pub struct FlowInsensitiveModel {
    objects: FxHashMap<PGNodeId, MemoryObject>,
}

impl FlowInsensitiveModel {
    pub fn new() -> Self {
        FlowInsensitiveModel::default()
    }

    fn object(&mut self, site: PGNodeId) -> &mut MemoryObject {
        self.objects
            .entry(site)
            .or_insert_with(|| MemoryObject::new(site))
    }
}

impl MemoryModel for FlowInsensitiveModel {
    fn preprocess(&mut self, built: &mut BuiltPointerGraph, options: &PTAOptions) {
        if options.preprocess_geps {
            preprocess_geps(built);
        }
    }

    fn read(&mut self, graph: &PointerGraph, _at: PGNodeId, ptr: Pointer) -> PointsToSet {
        if ptr.is_unknown() {
            let mut pts = PointsToSet::new();
            pts.insert(Pointer::unknown());
            // plus whatever was stored through unknown pointers
            if let Some(mo) = self.objects.get(&UNKNOWN_MEMORY_ID) {
                pts.union_with(&mo.pointers_at(Offset::UNKNOWN));
            }
            return pts;
        }
        let Some(site) = memory_site(graph, ptr.target) else {
            return PointsToSet::new();
        };
        if site == UNKNOWN_MEMORY_ID {
            let mut pts = PointsToSet::new();
            pts.insert(Pointer::unknown());
            return pts;
        }
        let mut result = self.object(site).pointers_at(ptr.offset);
        // zero-initialised memory reads as null until written
        if result.is_empty()
            && graph.node(site).alloc.map(|a| a.zeroed).unwrap_or(false)
        {
            result.insert(Pointer::null());
        }
        result
    }

    fn write(
        &mut self,
        graph: &PointerGraph,
        _at: PGNodeId,
        ptr: Pointer,
        values: &PointsToSet,
        _singleton: bool,
    ) -> bool {
        let site = if ptr.is_unknown() {
            UNKNOWN_MEMORY_ID
        } else {
            match memory_site(graph, ptr.target) {
                Some(s) => s,
                None => return false,
            }
        };
        self.object(site).add_pointers(ptr.offset, values)
    }

    fn copy(
        &mut self,
        graph: &PointerGraph,
        _at: PGNodeId,
        src: Pointer,
        dst: Pointer,
        len: Offset,
    ) -> bool {
        if len.is_zero() {
            return false;
        }
        let Some(src_site) = memory_site(graph, src.target) else {
            return false;
        };
        let Some(dst_site) = memory_site(graph, dst.target) else {
            return false;
        };

        // gather the slices of the source window first; source and
        // destination may be the same object
        let mut slices: Vec<(Offset, PointsToSet)> = Vec::new();
        if let Some(src_mo) = self.objects.get(&src_site) {
            for (&off, pts) in src_mo.offsets() {
                if let Some(dst_off) = copied_to(src.offset, dst.offset, len, off) {
                    slices.push((dst_off, pts.clone()));
                }
            }
        }

        let mut changed = false;
        let dst_mo = self.object(dst_site);
        for (off, pts) in slices {
            changed |= dst_mo.add_pointers(off, &pts);
        }
        changed
    }
}

/// Where does the byte stored at `stored_off` land in the destination,
/// if it sits inside the copied window at all? Any unknown collapses to
/// the unknown offset, saturating rather than overflowing.
pub(crate) fn copied_to(
    src_off: Offset,
    dst_off: Offset,
    len: Offset,
    stored_off: Offset,
) -> Option<Offset> {
    if src_off.is_unknown() || len.is_unknown() || stored_off.is_unknown() {
        return Some(Offset::UNKNOWN);
    }
    let start = src_off.value().expect("concrete");
    let length = len.value().expect("concrete");
    let at = stored_off.value().expect("concrete");
    if at < start || at >= start.saturating_add(length) {
        return None;
    }
    Some(dst_off + Offset::new(at - start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copied_bytes_keep_their_relative_offset() {
        assert_eq!(
            copied_to(
                Offset::new(4),
                Offset::new(16),
                Offset::new(8),
                Offset::new(6)
            ),
            Some(Offset::new(18))
        );
        assert_eq!(
            copied_to(
                Offset::new(4),
                Offset::new(16),
                Offset::new(8),
                Offset::new(12)
            ),
            None
        );
    }

    #[test]
    fn copy_saturates_on_unknown() {
        assert_eq!(
            copied_to(
                Offset::UNKNOWN,
                Offset::new(0),
                Offset::new(8),
                Offset::new(0)
            ),
            Some(Offset::UNKNOWN)
        );
    }
}
