//! Virtual device layer (§4.3, §3.3). A pool is a tree of [`VdevNode`]s;
//! leaves perform real I/O ([`leaf::FileVdev`]), interior nodes compose
//! their children's results (mirror, raidz, draid). Rather than the
//! teacher's void-star `vdev_ops_t` dispatch table, each kind is a variant
//! of one enum implementing a single [`VdevOps`] trait — the polymorphic
//! "set of operations on a trait, variant enumeration" shape §9's redesign
//! flags call for instead of virtual-inheritance-depth-2 dispatch tables.
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

pub mod draid;
pub mod label;
pub mod leaf;
pub mod mirror;
pub mod queue;
pub mod raidz;

pub use leaf::FileVdev;
pub use queue::{Priority, VdevQueue};

use crate::error::{SpaError, SpaResult};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum VdevState {
    Offline,
    Removed,
    CantOpen,
    Faulted,
    Degraded,
    Healthy,
}

/// Identifies a vdev within the pool's tree, stable across reopen/import
/// unlike a raw array index.
pub type VdevGuid = u64;

/// A span of transaction groups that a vdev missed updates for while
/// offline/faulted (§3.3 DTL). Resilver replays exactly these ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxgRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirtyTimeLog {
    ranges: Vec<TxgRange>,
}

impl DirtyTimeLog {
    pub fn new() -> Self {
        DirtyTimeLog { ranges: Vec::new() }
    }

    pub fn mark(&mut self, start: u64, end: u64) {
        self.ranges.push(TxgRange { start, end });
    }

    pub fn contains(&self, txg: u64) -> bool {
        self.ranges.iter().any(|r| txg >= r.start && txg < r.end)
    }

    pub fn clear_below(&mut self, txg: u64) {
        self.ranges.retain(|r| r.end > txg);
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// I/O operation kind a vdev's queue classifies work by (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdevOp {
    Read,
    Write,
    Flush,
    Trim,
    Probe,
}

/// A single in-flight request at the vdev boundary. Payload is owned here
/// (rather than handed in as an `Abd` reference) since the leaf vdevs in
/// this core are simple file-backed devices with no zero-copy ARC behind
/// them.
#[derive(Debug, Clone)]
pub struct VdevIo {
    pub op: VdevOp,
    pub offset: u64,
    pub data: Vec<u8>,
}

impl VdevIo {
    pub fn read(offset: u64, len: usize) -> Self {
        VdevIo { op: VdevOp::Read, offset, data: vec![0u8; len] }
    }

    pub fn write(offset: u64, data: Vec<u8>) -> Self {
        VdevIo { op: VdevOp::Write, offset, data }
    }
}

/// Common behavior every vdev kind in the tree provides. Interior vdevs
/// implement it by composing children; leaves implement it against real
/// storage.
pub trait VdevOps {
    fn open(&mut self) -> SpaResult<(u64, u8, u8)>;
    fn close(&mut self);
    fn io_start(&mut self, io: &mut VdevIo) -> SpaResult<()>;
    fn get_size(&self) -> u64;
    fn state(&self) -> VdevState;
    fn sync(&mut self) -> SpaResult<()>;
    /// A zero-length read at a known offset (§4.3 probe); default
    /// implementation issues a 1-byte read at offset 0 and discards it.
    fn probe(&mut self) -> SpaResult<()> {
        let mut io = VdevIo::read(0, 1);
        self.io_start(&mut io)
    }
}

/// One node of the vdev tree (§3.3). Interior kinds hold their children by
/// value (not `Arc`/raw pointer) since the tree is owned outright by the
/// `Spa` that contains it; cross-references (e.g. resilver source) are by
/// [`VdevGuid`] lookup rather than a shared pointer.
pub enum VdevNode {
    Root { guid: VdevGuid, children: Vec<VdevNode> },
    Mirror { guid: VdevGuid, children: Vec<VdevNode> },
    RaidZ { guid: VdevGuid, parity: u8, children: Vec<VdevNode> },
    Draid { guid: VdevGuid, config: draid::DraidConfig, children: Vec<VdevNode> },
    Replacing { guid: VdevGuid, children: Vec<VdevNode> },
    Spare { guid: VdevGuid, children: Vec<VdevNode> },
    File { guid: VdevGuid, dev: leaf::FileVdev },
    Missing { guid: VdevGuid },
    Hole { guid: VdevGuid },
}

impl VdevNode {
    pub fn guid(&self) -> VdevGuid {
        match self {
            VdevNode::Root { guid, .. }
            | VdevNode::Mirror { guid, .. }
            | VdevNode::RaidZ { guid, .. }
            | VdevNode::Draid { guid, .. }
            | VdevNode::Replacing { guid, .. }
            | VdevNode::Spare { guid, .. }
            | VdevNode::File { guid, .. }
            | VdevNode::Missing { guid }
            | VdevNode::Hole { guid } => *guid,
        }
    }

    pub fn children(&self) -> &[VdevNode] {
        match self {
            VdevNode::Root { children, .. }
            | VdevNode::Mirror { children, .. }
            | VdevNode::RaidZ { children, .. }
            | VdevNode::Replacing { children, .. }
            | VdevNode::Spare { children, .. } => children,
            VdevNode::Draid { children, .. } => children,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> &mut [VdevNode] {
        match self {
            VdevNode::Root { children, .. }
            | VdevNode::Mirror { children, .. }
            | VdevNode::RaidZ { children, .. }
            | VdevNode::Replacing { children, .. }
            | VdevNode::Spare { children, .. } => children,
            VdevNode::Draid { children, .. } => children,
            _ => &mut [],
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            VdevNode::File { .. } | VdevNode::Missing { .. } | VdevNode::Hole { .. }
        )
    }

    /// Open this vdev and every descendant, bottom-up, matching
    /// `vdev_open`'s post-order traversal.
    pub fn open_tree(&mut self) -> SpaResult<()> {
        for child in self.children_mut() {
            child.open_tree()?;
        }
        match self {
            VdevNode::File { dev, .. } => {
                dev.open()?;
            }
            VdevNode::Missing { .. } | VdevNode::Hole { .. } => {}
            _ => {}
        }
        Ok(())
    }

    pub fn state(&self) -> VdevState {
        match self {
            VdevNode::File { dev, .. } => dev.state(),
            VdevNode::Missing { .. } => VdevState::CantOpen,
            VdevNode::Hole { .. } => VdevState::Healthy,
            _ => {
                // Interior vdev health follows worst-child-but-one policy:
                // healthy if enough children are healthy to satisfy
                // redundancy; approximated here as "any child healthy"
                // since full N-of-M policy lives with each composition's
                // own read/write logic.
                if self.children().iter().any(|c| c.state() == VdevState::Healthy) {
                    VdevState::Healthy
                } else {
                    VdevState::CantOpen
                }
            }
        }
    }

    /// Read `len` bytes at `offset`, composing children per this node's
    /// kind (§4.3 mirror/raidz contracts). Writes go through
    /// [`VdevNode::write`].
    pub fn read(&mut self, offset: u64, len: usize) -> SpaResult<Vec<u8>> {
        match self {
            VdevNode::File { dev, .. } => dev.read(offset, len),
            VdevNode::Mirror { children, .. } => mirror::read(children, offset, len),
            VdevNode::RaidZ { parity, children, .. } => raidz::read(children, *parity, offset, len),
            VdevNode::Hole { .. } => Ok(vec![0u8; len]),
            VdevNode::Missing { .. } => Err(SpaError::Eio),
            VdevNode::Root { children, .. } => {
                children.first_mut().ok_or(SpaError::Einval)?.read(offset, len)
            }
            VdevNode::Replacing { children, .. } | VdevNode::Spare { children, .. } => {
                children.first_mut().ok_or(SpaError::Eio)?.read(offset, len)
            }
            VdevNode::Draid { children, config, .. } => draid::read(children, config, offset, len),
        }
    }

    /// Usable capacity of this vdev (top-level vdevs report this to the
    /// metaslab layer so it knows how much space to carve). Interior
    /// kinds report the capacity their redundancy policy actually makes
    /// available, not the raw sum of children.
    pub fn get_size(&self) -> u64 {
        match self {
            VdevNode::File { dev, .. } => dev.get_size(),
            VdevNode::Hole { .. } | VdevNode::Missing { .. } => 0,
            VdevNode::Mirror { children, .. }
            | VdevNode::Replacing { children, .. }
            | VdevNode::Spare { children, .. } => {
                children.iter().map(|c| c.get_size()).min().unwrap_or(0)
            }
            VdevNode::RaidZ { parity, children, .. } => {
                let min_child = children.iter().map(|c| c.get_size()).min().unwrap_or(0);
                let data_columns = children.len().saturating_sub(*parity as usize);
                min_child * data_columns as u64
            }
            VdevNode::Draid { children, config, .. } => {
                let min_child = children.iter().map(|c| c.get_size()).min().unwrap_or(0);
                min_child * config.ndata as u64
            }
            VdevNode::Root { children, .. } => children.first().map(|c| c.get_size()).unwrap_or(0),
        }
    }

    pub fn write(&mut self, offset: u64, data: &[u8]) -> SpaResult<()> {
        match self {
            VdevNode::File { dev, .. } => dev.write(offset, data),
            VdevNode::Mirror { children, .. } => mirror::write(children, offset, data),
            VdevNode::RaidZ { parity, children, .. } => {
                raidz::write(children, *parity, offset, data)
            }
            VdevNode::Hole { .. } => Ok(()),
            VdevNode::Missing { .. } => Err(SpaError::Eio),
            VdevNode::Root { children, .. } => {
                children.first_mut().ok_or(SpaError::Einval)?.write(offset, data)
            }
            VdevNode::Replacing { children, .. } | VdevNode::Spare { children, .. } => {
                for c in children.iter_mut() {
                    c.write(offset, data)?;
                }
                Ok(())
            }
            VdevNode::Draid { children, config, .. } => {
                draid::write(children, config, offset, data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hole_reads_return_zeros() {
        let mut node = VdevNode::Hole { guid: 1 };
        let data = node.read(0, 16).unwrap();
        assert_eq!(data, vec![0u8; 16]);
    }

    #[test]
    fn missing_vdev_reads_fail() {
        let mut node = VdevNode::Missing { guid: 1 };
        assert_eq!(node.read(0, 16).unwrap_err(), SpaError::Eio);
    }

    #[test]
    fn mirror_capacity_is_the_smallest_child() {
        let node = VdevNode::Mirror {
            guid: 1,
            children: vec![VdevNode::Hole { guid: 2 }, VdevNode::Missing { guid: 3 }],
        };
        assert_eq!(node.get_size(), 0);
    }
}
