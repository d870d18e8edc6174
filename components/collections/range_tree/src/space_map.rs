//! On-disk log of allocations and frees for a metaslab, replayed into a
//! [`RangeTree`] at pool import. Mirrors `space_map.c`'s entry log, traded
//! down to a plain `serde`-serializable `Vec` since the underlying vdev
//! block layout is out of scope here.
use crate::RangeTree;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpaceMapOp {
    Alloc,
    Free,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceMapEntry {
    pub op: SpaceMapOp,
    pub offset: u64,
    pub size: u64,
}

/// An append-only log of [`SpaceMapEntry`] records plus the running totals
/// `space_map_update` would report without needing a full replay.
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct SpaceMap {
    entries: Vec<SpaceMapEntry>,
    alloc: u64,
    freed: u64,
}

impl SpaceMap {
    pub fn new() -> Self {
        SpaceMap { entries: Vec::new(), alloc: 0, freed: 0 }
    }

    pub fn record_alloc(&mut self, offset: u64, size: u64) {
        self.entries.push(SpaceMapEntry { op: SpaceMapOp::Alloc, offset, size });
        self.alloc += size;
    }

    pub fn record_free(&mut self, offset: u64, size: u64) {
        self.entries.push(SpaceMapEntry { op: SpaceMapOp::Free, offset, size });
        self.freed += size;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Net bytes represented by the log: allocations made minus space
    /// freed back, matching `sm_alloc - sm_dealloc` in the original format.
    pub fn net_allocated(&self) -> i64 {
        self.alloc as i64 - self.freed as i64
    }

    /// Replays the log into a tree of free space, given the metaslab's
    /// total extent. A log starting from an "all free" metaslab applies
    /// allocations as removals and frees as additions.
    pub fn replay_free_space(&self, start: u64, size: u64) -> RangeTree {
        let mut tree = RangeTree::new();
        tree.add(start, size);
        for entry in &self.entries {
            match entry.op {
                SpaceMapOp::Alloc => tree.remove(entry.offset, entry.size),
                SpaceMapOp::Free => tree.add(entry.offset, entry.size),
            }
        }
        tree
    }

    /// Condenses the log to its minimal form: a single `Free` entry per
    /// live extent in `tree`, dropping the allocate/free history. Mirrors
    /// `space_map_condense`, which exists because an uncompacted log can
    /// grow far larger than the space it describes.
    pub fn condense(tree: &RangeTree) -> Self {
        let mut sm = SpaceMap::new();
        for (start, size) in tree.iter() {
            sm.record_free(start, size);
        }
        sm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_reconstructs_free_space() {
        let mut sm = SpaceMap::new();
        sm.record_alloc(0, 100);
        sm.record_free(40, 20);
        let tree = sm.replay_free_space(0, 100);
        assert!(tree.contains(40, 20));
        assert!(!tree.contains(0, 40));
        assert_eq!(tree.space(), 20);
    }

    #[test]
    fn condense_drops_history_but_keeps_result() {
        let mut tree = RangeTree::new();
        tree.add(0, 100);
        tree.remove(20, 10);
        let sm = SpaceMap::condense(&tree);
        assert_eq!(sm.len(), tree.segment_count());
        // a condensed log is a pure additive description, independent of
        // the metaslab's nominal extent.
        let mut from_log = RangeTree::new();
        for e in sm.entries.iter() {
            from_log.add(e.offset, e.size);
        }
        assert_eq!(from_log.space(), tree.space());
    }
}
