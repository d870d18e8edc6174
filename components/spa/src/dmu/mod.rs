//! DMU object layer (§4.7): dnodes describe objects (their type, bonus
//! buffer, and block tree shape); dbufs cache the live, possibly-dirty
//! in-memory copy of one block of one object, keyed by (object, level,
//! blkid) the way `dbuf_hash_table` looks them up. Per §9's redesign
//! flag, a dbuf's children (and a dnode's dbufs) are held by `Arc` so a
//! reader pinning a block can outlive the structure that indexed it
//! without a use-after-free, rather than the teacher's raw `void *`
//! hash-chain links.
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::blkptr::Blkptr;
use crate::error::{SpaError, SpaResult};

pub mod traverse;

pub use traverse::{traverse, TraverseFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DnodeType {
    None,
    Meta,
    PlainFile,
    DirectoryContents,
    ObjectArray,
    PackedNvlist,
    Bonus,
    SpaceMap,
    Zap,
}

/// `dnode_phys_t`'s essential shape: a fixed number of direct block
/// pointers, with `nlevels` controlling how many of indirection sit above
/// them (`nlevels == 1` means the direct BPs are leaf data blocks).
pub struct Dnode {
    pub object: u64,
    pub dn_type: DnodeType,
    pub datablksz: u32,
    pub nlevels: u8,
    pub maxblkid: u64,
    pub bonus: Vec<u8>,
    pub direct_bps: Vec<Option<Blkptr>>,
    dbufs: Mutex<HashMap<(u8, u64), Arc<Dbuf>>>,
}

impl Dnode {
    pub fn new(object: u64, dn_type: DnodeType, datablksz: u32) -> Self {
        Dnode {
            object,
            dn_type,
            datablksz,
            nlevels: 1,
            maxblkid: 0,
            bonus: Vec::new(),
            direct_bps: vec![None; 1],
            dbufs: Mutex::new(HashMap::new()),
        }
    }

    /// Ensures block `blkid` at `level` has a direct slot, growing
    /// `direct_bps`/`maxblkid` to cover it (§4.7 "dnode grows its block
    /// tree on demand").
    pub fn ensure_blkid(&mut self, blkid: u64) {
        if blkid as usize >= self.direct_bps.len() {
            self.direct_bps.resize((blkid + 1) as usize, None);
        }
        if blkid > self.maxblkid {
            self.maxblkid = blkid;
        }
    }

    pub fn set_bp(&mut self, blkid: u64, bp: Blkptr) {
        self.ensure_blkid(blkid);
        self.direct_bps[blkid as usize] = Some(bp);
    }

    pub fn get_bp(&self, blkid: u64) -> Option<&Blkptr> {
        self.direct_bps.get(blkid as usize).and_then(|b| b.as_ref())
    }

    /// `dmu_free_range`: punches a hole over `[start, end)` blocks,
    /// dropping their block pointers (the freed space becomes reclaimable
    /// once the owning txg syncs — the allocator side of that is the
    /// metaslab's deferred-free queue, not this layer's job).
    pub fn free_range(&mut self, start_blkid: u64, end_blkid: u64) {
        for blkid in start_blkid..end_blkid.min(self.direct_bps.len() as u64) {
            self.direct_bps[blkid as usize] = None;
        }
    }

    pub fn hold_dbuf(&self, level: u8, blkid: u64) -> Arc<Dbuf> {
        let mut dbufs = self.dbufs.lock();
        dbufs
            .entry((level, blkid))
            .or_insert_with(|| Arc::new(Dbuf::new(self.object, level, blkid)))
            .clone()
    }

    pub fn evict_unreferenced(&self) {
        let mut dbufs = self.dbufs.lock();
        dbufs.retain(|_, d| Arc::strong_count(d) > 1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbufState {
    Uncached,
    Read,
    Cached,
    Fill,
    Evicting,
}

/// One dirty version of a dbuf's contents, keyed by the txg that will
/// write it out. `dbuf_dirty_record_t`'s role: lets a writer in an open
/// txg mutate a buffer while an in-flight sync of an older txg still
/// reads its own snapshot.
pub struct DirtyRecord {
    pub txg: u64,
    pub data: Vec<u8>,
}

pub struct Dbuf {
    pub object: u64,
    pub level: u8,
    pub blkid: u64,
    state: Mutex<DbufState>,
    data: Mutex<Vec<u8>>,
    dirty: Mutex<Vec<DirtyRecord>>,
    parent: Mutex<Weak<Dbuf>>,
}

impl Dbuf {
    fn new(object: u64, level: u8, blkid: u64) -> Self {
        Dbuf {
            object,
            level,
            blkid,
            state: Mutex::new(DbufState::Uncached),
            data: Mutex::new(Vec::new()),
            dirty: Mutex::new(Vec::new()),
            parent: Mutex::new(Weak::new()),
        }
    }

    pub fn state(&self) -> DbufState {
        *self.state.lock()
    }

    pub fn fill(&self, bytes: Vec<u8>) {
        *self.state.lock() = DbufState::Fill;
        *self.data.lock() = bytes;
        *self.state.lock() = DbufState::Cached;
    }

    pub fn read(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Records a new dirty version for `txg`, matching `dbuf_dirty`'s
    /// one-record-per-open-txg invariant: a second dirty in the same txg
    /// replaces rather than appends.
    pub fn dirty(&self, txg: u64, data: Vec<u8>) {
        let mut records = self.dirty.lock();
        if let Some(existing) = records.iter_mut().find(|r| r.txg == txg) {
            existing.data = data;
        } else {
            records.push(DirtyRecord { txg, data });
        }
    }

    pub fn dirty_record_for(&self, txg: u64) -> Option<Vec<u8>> {
        self.dirty.lock().iter().find(|r| r.txg == txg).map(|r| r.data.clone())
    }

    /// Sync this dbuf's dirty record for `txg` into its cached contents
    /// and drop the record, matching `dbuf_sync_leaf`.
    pub fn sync(&self, txg: u64) -> SpaResult<()> {
        let mut records = self.dirty.lock();
        let idx = records.iter().position(|r| r.txg == txg).ok_or(SpaError::Einval)?;
        let record = records.remove(idx);
        drop(records);
        self.fill(record.data);
        Ok(())
    }

    pub fn set_parent(&self, parent: &Arc<Dbuf>) {
        *self.parent.lock() = Arc::downgrade(parent);
    }

    pub fn parent(&self) -> Option<Arc<Dbuf>> {
        self.parent.lock().upgrade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dnode_grows_its_direct_block_array_on_demand() {
        let mut dn = Dnode::new(1, DnodeType::PlainFile, 4096);
        dn.set_bp(5, Blkptr::new());
        assert_eq!(dn.maxblkid, 5);
        assert!(dn.get_bp(5).is_some());
        assert!(dn.get_bp(2).is_none());
    }

    #[test]
    fn free_range_drops_block_pointers() {
        let mut dn = Dnode::new(1, DnodeType::PlainFile, 4096);
        dn.set_bp(0, Blkptr::new());
        dn.set_bp(1, Blkptr::new());
        dn.free_range(0, 2);
        assert!(dn.get_bp(0).is_none());
        assert!(dn.get_bp(1).is_none());
    }

    #[test]
    fn dbuf_dirty_then_sync_updates_cached_contents() {
        let dn = Dnode::new(1, DnodeType::PlainFile, 4096);
        let dbuf = dn.hold_dbuf(0, 0);
        dbuf.dirty(7, b"hello".to_vec());
        dbuf.sync(7).unwrap();
        assert_eq!(dbuf.read(), b"hello");
        assert_eq!(dbuf.state(), DbufState::Cached);
    }

    #[test]
    fn holding_the_same_blkid_twice_returns_the_same_dbuf() {
        let dn = Dnode::new(1, DnodeType::PlainFile, 4096);
        let a = dn.hold_dbuf(0, 3);
        let b = dn.hold_dbuf(0, 3);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
