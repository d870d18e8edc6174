//! Dedup table (§4.9): maps a block's (checksum, compression, psize) key
//! to the DVAs it's already stored at plus a reference count, so a second
//! write of identical content becomes a refcount bump instead of a new
//! allocation. Backed by [`btree::BTreeMap`] (grounded on the same
//! structure the teacher's collections already provide) rather than a
//! real on-disk ZAP object, since the physical ZAP format is outside this
//! core's scope.
use btree::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::blkptr::Dva;
use crate::error::{SpaError, SpaResult};
use crate::sio::{SIOChecksum, SIOCompress};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DdtKey {
    pub checksum: [u8; 32],
    pub compress: SIOCompress,
    pub psize: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdtEntry {
    pub dva: Dva,
    pub phys_birth: u64,
    pub refcount: u64,
}

/// In-memory dedup table; `algo` names the checksum family every key in
/// this table was computed with (`dedup_table_t` is per-checksum in real
/// ZFS since comparing hashes from different algorithms is meaningless).
pub struct Ddt {
    algo: SIOChecksum,
    entries: std::collections::HashMap<DdtKey, DdtEntry>,
}

impl Ddt {
    pub fn new(algo: SIOChecksum) -> Self {
        Ddt { algo, entries: std::collections::HashMap::new() }
    }

    pub fn algo(&self) -> SIOChecksum {
        self.algo
    }

    pub fn lookup(&self, key: &DdtKey) -> Option<&DdtEntry> {
        self.entries.get(key)
    }

    /// `ddt_lookup`+write path (§4.9 step 2): if `key` already exists,
    /// bump its refcount and hand back the existing DVA so the caller
    /// skips allocation entirely; otherwise insert a fresh entry pointing
    /// at the freshly-allocated `dva`.
    pub fn write(&mut self, key: DdtKey, dva: Dva, phys_birth: u64) -> Dva {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.refcount += 1;
            return entry.dva.clone();
        }
        self.entries.insert(key, DdtEntry { dva: dva.clone(), phys_birth, refcount: 1 });
        dva
    }

    /// `ddt_free` path (§4.9 step 3): decrement refcount, actually freeing
    /// the backing DVA (signalled by returning it) only once it reaches
    /// zero.
    pub fn free(&mut self, key: &DdtKey) -> SpaResult<Option<Dva>> {
        let entry = self.entries.get_mut(key).ok_or(SpaError::Enoent)?;
        entry.refcount -= 1;
        if entry.refcount == 0 {
            let dva = entry.dva.clone();
            self.entries.remove(key);
            Ok(Some(dva))
        } else {
            Ok(None)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot every (key, entry) pair for persistence across reopen;
    /// order is incidental, the label round-trip only needs the set back.
    pub fn snapshot(&self) -> Vec<(DdtKey, DdtEntry)> {
        self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Rebuild a table from a prior [`Ddt::snapshot`].
    pub fn restore(algo: SIOChecksum, entries: Vec<(DdtKey, DdtEntry)>) -> Self {
        Ddt { algo, entries: entries.into_iter().collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A histogram of entry counts bucketed by refcount (capped bucket
    /// index at 8+, matching `zpool status -D`'s "ref>=8" catch-all row).
    pub fn histogram(&self) -> [u64; 9] {
        let mut hist = [0u64; 9];
        for entry in self.entries.values() {
            let bucket = (entry.refcount as usize).min(8);
            hist[bucket] += 1;
        }
        hist
    }
}

/// Sparse index from object id to the dnode's starting blkid, backed by
/// the same generic btree the collections crate exposes, demonstrating
/// the ZAP-like "ordered key -> small value" access pattern the MOS
/// object directory uses alongside the dedup table itself.
pub struct ObjectDirectory {
    map: BTreeMap<u64, u64>,
}

impl ObjectDirectory {
    pub fn new() -> Self {
        ObjectDirectory { map: BTreeMap::new() }
    }

    pub fn insert(&mut self, object: u64, dnode_blkid: u64) {
        self.map.insert(object, dnode_blkid);
    }

    pub fn get(&self, object: u64) -> Option<u64> {
        self.map.get(&object).copied()
    }
}

impl Default for ObjectDirectory {
    fn default() -> Self {
        ObjectDirectory::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_dva(offset: u64) -> Dva {
        let mut d = Dva::new();
        d.set_offset(offset);
        d
    }

    #[test]
    fn second_write_of_identical_content_bumps_refcount_instead_of_allocating() {
        let mut ddt = Ddt::new(SIOChecksum::Sha256);
        let key = DdtKey { checksum: [7u8; 32], compress: SIOCompress::Lz4, psize: 4096 };
        let first = ddt.write(key.clone(), dummy_dva(100), 1);
        let second = ddt.write(key.clone(), dummy_dva(200), 1);
        assert_eq!(first, second);
        assert_eq!(ddt.lookup(&key).unwrap().refcount, 2);
    }

    #[test]
    fn free_only_reclaims_once_refcount_hits_zero() {
        let mut ddt = Ddt::new(SIOChecksum::Sha256);
        let key = DdtKey { checksum: [1u8; 32], compress: SIOCompress::Off, psize: 512 };
        ddt.write(key.clone(), dummy_dva(0), 1);
        ddt.write(key.clone(), dummy_dva(0), 1);
        assert!(ddt.free(&key).unwrap().is_none());
        assert!(ddt.free(&key).unwrap().is_some());
        assert!(ddt.lookup(&key).is_none());
    }

    #[test]
    fn histogram_buckets_by_refcount() {
        let mut ddt = Ddt::new(SIOChecksum::Sha256);
        let key = DdtKey { checksum: [2u8; 32], compress: SIOCompress::Off, psize: 512 };
        ddt.write(key.clone(), dummy_dva(0), 1);
        let hist = ddt.histogram();
        assert_eq!(hist[1], 1);
    }
}
