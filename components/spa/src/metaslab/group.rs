//! Metaslab group (§4.2): the set of metaslabs belonging to one
//! top-level vdev, selected by the allocator ahead of picking an
//! individual metaslab within it. Groups let the allocator balance writes
//! across top-level vdevs (so a pool with an extra mirror added later
//! isn't starved) before descending into per-vdev metaslab weight.
use crate::error::{SpaError, SpaResult};
use crate::metaslab::{Aggsum, MetaslabArray};

pub struct MetaslabGroup {
    pub vdev_guid: u64,
    pub metaslabs: MetaslabArray,
    free: Aggsum,
    allocatable: bool,
}

impl MetaslabGroup {
    pub fn new(vdev_guid: u64, vdev_size: u64, metaslab_size: u64) -> Self {
        let metaslabs = MetaslabArray::carve(vdev_size, metaslab_size);
        let free = Aggsum::new(4);
        free.add(0, metaslabs.total_free() as i64);
        MetaslabGroup { vdev_guid, metaslabs, free, allocatable: true }
    }

    /// Excluded from allocation, e.g. while its vdev is being removed or
    /// is unhealthy (§4.2's "metaslab group allocatable" gate).
    pub fn set_allocatable(&mut self, allocatable: bool) {
        self.allocatable = allocatable;
    }

    pub fn is_allocatable(&self) -> bool {
        self.allocatable
    }

    pub fn free_space(&self) -> i64 {
        self.free.value()
    }

    pub fn alloc(&mut self, size: u64) -> SpaResult<(u64, u64)> {
        if !self.allocatable {
            return Err(SpaError::Enospc);
        }
        let (ms_id, offset) = self.metaslabs.alloc_best(size)?;
        self.free.add(0, -(size as i64));
        Ok((ms_id, offset))
    }

    pub fn free(&mut self, ms_id: u64, offset: u64, size: u64, txg: u64) {
        if let Some(ms) = self.metaslabs.get_mut(ms_id) {
            ms.free(offset, size, txg);
        }
        self.free.add(0, size as i64);
    }

    pub fn commit_frees(&mut self, synced_txg: u64) {
        for ms in self.metaslabs.iter_mut() {
            ms.commit_frees(synced_txg);
        }
    }

    /// Rebuild a group from metaslabs recovered from a label's space maps,
    /// in place of [`MetaslabGroup::new`]'s carve-from-empty path.
    pub fn restore(vdev_guid: u64, metaslabs: MetaslabArray) -> Self {
        let free = Aggsum::new(4);
        free.add(0, metaslabs.total_free() as i64);
        MetaslabGroup { vdev_guid, metaslabs, free, allocatable: true }
    }
}

/// Selects which of several groups (top-level vdevs) to allocate from: the
/// one with the most free space among allocatable groups, matching
/// `metaslab_group_alloc`'s load-balancing goal without its full
/// historical-throughput weighting.
pub fn select_group(groups: &mut [MetaslabGroup], size: u64) -> SpaResult<(u64, u64, u64)> {
    let best = groups
        .iter()
        .enumerate()
        .filter(|(_, g)| g.is_allocatable() && g.free_space() >= size as i64)
        .max_by_key(|(_, g)| g.free_space())
        .map(|(i, _)| i)
        .ok_or(SpaError::Enospc)?;
    let (ms_id, offset) = groups[best].alloc(size)?;
    Ok((groups[best].vdev_guid, ms_id, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_tracks_free_space_across_allocations() {
        let mut g = MetaslabGroup::new(1, 1000, 200);
        let before = g.free_space();
        g.alloc(50).unwrap();
        assert_eq!(g.free_space(), before - 50);
    }

    #[test]
    fn non_allocatable_group_rejects_allocation() {
        let mut g = MetaslabGroup::new(1, 1000, 200);
        g.set_allocatable(false);
        assert_eq!(g.alloc(10).unwrap_err(), crate::error::SpaError::Enospc);
    }

    #[test]
    fn select_group_picks_the_vdev_with_more_free_space() {
        let mut groups = vec![
            MetaslabGroup::new(1, 100, 50),
            MetaslabGroup::new(2, 1000, 50),
        ];
        let (guid, _, _) = select_group(&mut groups, 10).unwrap();
        assert_eq!(guid, 2);
    }
}
