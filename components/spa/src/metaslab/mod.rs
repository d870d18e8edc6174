//! Metaslab allocator (§4.2): each top-level vdev is carved into
//! fixed-size metaslabs, each backed by a [`SpaceMap`] append-only free-
//! space log and a [`RangeTree`] of currently-free extents kept in
//! memory once the metaslab is loaded. Allocation picks the
//! highest-weighted loaded-or-loadable metaslab in a vdev and first-fits
//! within it, falling back to a gang block when nothing fits (§4.4.5).
use std::collections::HashMap;

use range_tree::{RangeTree, SpaceMap};

use crate::error::{SpaError, SpaResult};

pub mod aggsum;
pub mod group;

pub use aggsum::Aggsum;
pub use group::MetaslabGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaslabState {
    /// Space map exists on disk but the range tree has not been read in.
    Unloaded,
    Loaded,
}

/// A free recorded at `txg` whose merge into the allocatable tree is
/// deferred until that txg has synced (`ms_defertree`), so a rolled-back
/// transaction never hands out space that was never truly durable.
struct DeferredFree {
    offset: u64,
    size: u64,
    txg: u64,
}

pub struct Metaslab {
    pub id: u64,
    pub start: u64,
    pub size: u64,
    state: MetaslabState,
    space_map: SpaceMap,
    free: Option<RangeTree>,
    deferred: Vec<DeferredFree>,
}

impl Metaslab {
    pub fn new(id: u64, start: u64, size: u64) -> Self {
        Metaslab {
            id,
            start,
            size,
            state: MetaslabState::Unloaded,
            space_map: SpaceMap::new(),
            free: None,
            deferred: Vec::new(),
        }
    }

    pub fn state(&self) -> MetaslabState {
        self.state
    }

    /// Replay the space map's alloc/free log into a fresh range tree,
    /// matching `metaslab_load`'s cold-start path.
    pub fn load(&mut self) {
        if self.state == MetaslabState::Loaded {
            return;
        }
        self.free = Some(self.space_map.replay_free_space(self.start, self.size));
        self.state = MetaslabState::Loaded;
    }

    pub fn unload(&mut self) {
        self.free = None;
        self.state = MetaslabState::Unloaded;
    }

    /// Free space available for allocation, correct whether or not the
    /// metaslab is currently loaded.
    pub fn free_space(&self) -> u64 {
        (self.size as i64 - self.space_map.net_allocated()) as u64
    }

    /// `metaslab_weight`: the simplest useful policy — free bytes, biased
    /// down for heavily fragmented metaslabs (many small free segments cost
    /// more seeks per byte recovered than one big one).
    pub fn weight(&self) -> u64 {
        let free = self.free_space();
        match &self.free {
            Some(tree) if tree.segment_count() > 0 => free / (tree.segment_count() as u64),
            _ => free,
        }
    }

    /// First-fit allocation within this metaslab; records the allocation
    /// to the space map and removes it from the in-memory free tree.
    /// Requires the metaslab to be loaded.
    pub fn alloc(&mut self, size: u64) -> SpaResult<u64> {
        let tree = self.free.as_mut().ok_or(SpaError::Einval)?;
        let (offset, _) = tree.find_first_fit(size).ok_or(SpaError::Enospc)?;
        tree.remove(offset, size);
        self.space_map.record_alloc(offset, size);
        Ok(offset)
    }

    /// Record a free at `txg`; the affected range only becomes
    /// allocatable again once [`Metaslab::commit_frees`] is called for a
    /// txg at or past `txg`.
    pub fn free(&mut self, offset: u64, size: u64, txg: u64) {
        self.deferred.push(DeferredFree { offset, size, txg });
    }

    /// Merge frees recorded at or before `synced_txg` back into the
    /// allocatable range tree and the durable space map.
    pub fn commit_frees(&mut self, synced_txg: u64) {
        let (ready, pending): (Vec<_>, Vec<_>) =
            self.deferred.drain(..).partition(|d| d.txg <= synced_txg);
        self.deferred = pending;
        for d in ready {
            self.space_map.record_free(d.offset, d.size);
            if let Some(tree) = self.free.as_mut() {
                tree.add(d.offset, d.size);
            }
        }
    }

    pub fn condense(&mut self) {
        if let Some(tree) = &self.free {
            self.space_map = SpaceMap::condense(tree);
        }
    }

    pub fn space_map(&self) -> &SpaceMap {
        &self.space_map
    }

    /// Rebuild a metaslab from a space map recovered from a label, rather
    /// than starting from an empty "all free" log (`metaslab_init` reading
    /// an existing on-disk space map back in at import).
    pub fn from_space_map(id: u64, start: u64, size: u64, space_map: SpaceMap) -> Self {
        Metaslab { id, start, size, state: MetaslabState::Unloaded, space_map, free: None, deferred: Vec::new() }
    }
}

/// Top-level vdev's collection of metaslabs, carved at a fixed
/// [`crate::config::SpaConfig::metaslab_size`] granularity.
pub struct MetaslabArray {
    metaslabs: HashMap<u64, Metaslab>,
}

impl MetaslabArray {
    pub fn carve(vdev_size: u64, metaslab_size: u64) -> Self {
        Self::carve_from(0, vdev_size, metaslab_size)
    }

    /// Like [`MetaslabArray::carve`], but the carved region starts at
    /// `base` rather than device offset zero — used to keep the
    /// allocator out of a leading reservation (e.g. vdev label space).
    pub fn carve_from(base: u64, vdev_size: u64, metaslab_size: u64) -> Self {
        let mut metaslabs = HashMap::new();
        let mut offset = base;
        let end = base + vdev_size;
        let mut id = 0u64;
        while offset < end {
            let size = metaslab_size.min(end - offset);
            metaslabs.insert(id, Metaslab::new(id, offset, size));
            offset += size;
            id += 1;
        }
        MetaslabArray { metaslabs }
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Metaslab> {
        self.metaslabs.get_mut(&id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Metaslab> {
        self.metaslabs.values_mut()
    }

    pub fn len(&self) -> usize {
        self.metaslabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metaslabs.is_empty()
    }

    /// Select the highest-weighted metaslab with enough free space,
    /// loading it if necessary, and allocate from it; on `ENOSPC` the
    /// caller should fall back to a gang block.
    pub fn alloc_best(&mut self, size: u64) -> SpaResult<(u64, u64)> {
        let best_id = self
            .metaslabs
            .values()
            .filter(|m| m.free_space() >= size)
            .max_by_key(|m| m.weight())
            .map(|m| m.id)
            .ok_or(SpaError::Enospc)?;
        let ms = self.metaslabs.get_mut(&best_id).unwrap();
        if ms.state() != MetaslabState::Loaded {
            ms.load();
        }
        let offset = ms.alloc(size)?;
        Ok((best_id, offset))
    }

    pub fn total_free(&self) -> u64 {
        self.metaslabs.values().map(|m| m.free_space()).sum()
    }

    /// Snapshot every metaslab's space map for persistence across reopen;
    /// `(id, start, size, space_map)` carries enough to reconstruct each
    /// metaslab without replaying it (`load` does that lazily afterward).
    pub fn snapshot(&self) -> Vec<(u64, u64, u64, SpaceMap)> {
        self.metaslabs.values().map(|m| (m.id, m.start, m.size, m.space_map().clone())).collect()
    }

    /// Rebuild an array from a prior [`MetaslabArray::snapshot`], in place
    /// of [`MetaslabArray::carve`]'s all-free starting state.
    pub fn restore(snapshot: Vec<(u64, u64, u64, SpaceMap)>) -> Self {
        let mut metaslabs = HashMap::new();
        for (id, start, size, space_map) in snapshot {
            metaslabs.insert(id, Metaslab::from_space_map(id, start, size, space_map));
        }
        MetaslabArray { metaslabs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carve_splits_vdev_into_fixed_size_metaslabs() {
        let arr = MetaslabArray::carve(100, 30);
        assert_eq!(arr.len(), 4); // 30,30,30,10
    }

    #[test]
    fn alloc_and_free_round_trip_through_space_map() {
        let mut ms = Metaslab::new(0, 0, 1000);
        ms.load();
        let off = ms.alloc(100).unwrap();
        assert_eq!(ms.free_space(), 900);
        ms.free(off, 100, 1);
        ms.commit_frees(1);
        assert_eq!(ms.free_space(), 1000);
    }

    #[test]
    fn deferred_free_does_not_become_allocatable_early() {
        let mut ms = Metaslab::new(0, 0, 1000);
        ms.load();
        let off = ms.alloc(100).unwrap();
        ms.free(off, 100, 5);
        ms.commit_frees(4);
        assert_eq!(ms.free_space(), 900);
        ms.commit_frees(5);
        assert_eq!(ms.free_space(), 1000);
    }

    #[test]
    fn alloc_fails_cleanly_when_exhausted() {
        let mut ms = Metaslab::new(0, 0, 100);
        ms.load();
        assert!(ms.alloc(100).is_ok());
        assert_eq!(ms.alloc(1).unwrap_err(), SpaError::Enospc);
    }

    #[test]
    fn array_picks_the_best_metaslab_and_allocates_from_it() {
        let mut arr = MetaslabArray::carve(300, 100);
        let (id, offset) = arr.alloc_best(50).unwrap();
        assert!(id < 3);
        assert_eq!(offset, 0);
    }
}
