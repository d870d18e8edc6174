//! ZIO pipeline (§4.6): every I/O the pool issues — reads, writes, frees,
//! claims, and the gang/vdev-label I/O nested underneath them — is a
//! `zio_t` node advancing through a fixed sequence of stages. Real ZFS
//! links parents to children with raw `zio_t *` pointers and an
//! intrusive list; per §9's redesign flag, this core instead keeps every
//! zio in one arena `Vec` and refers to parents/children by [`ZioId`]
//! (a plain index), so the DAG can't dangle and is trivially `Send`.
use bitflags::bitflags;

use crate::blkptr::Blkptr;
use crate::error::SpaError;
use crate::vdev::queue::Priority;

pub mod pipeline;

pub use pipeline::ZioPipeline;

pub type ZioId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZioType {
    Read,
    Write,
    Free,
    Claim,
    IoCtl,
}

/// Ordered pipeline stages a zio advances through (§4.6). Not every type
/// visits every stage — a read skips `Compress`/`Encrypt`/`Allocate` and
/// instead verifies the checksum it read back at `Verify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ZioStage {
    Open,
    Compress,
    Encrypt,
    Checksum,
    Allocate,
    VdevIo,
    Verify,
    Assess,
    Done,
}

impl ZioStage {
    fn next(self) -> ZioStage {
        use ZioStage::*;
        match self {
            Open => Compress,
            Compress => Encrypt,
            Encrypt => Checksum,
            Checksum => Allocate,
            Allocate => VdevIo,
            VdevIo => Verify,
            Verify => Assess,
            Assess => Done,
            Done => Done,
        }
    }
}

bitflags! {
    /// Execution-control flags threaded through a zio (§4.6's flag
    /// vocabulary). Named for parity with `zio_flag_t`.
    pub struct ZioFlags: u32 {
        const DONT_RETRY    = 0x01;
        const CANFAIL       = 0x02;
        const OPTIONAL      = 0x04;
        const REEXECUTED    = 0x08;
        const GANG_CHILD    = 0x10;
        const IO_REPAIR     = 0x20;
        const SPECULATIVE   = 0x40;
        const RAW_COMPRESS  = 0x80;
        const NODATA        = 0x100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZioError {
    Io,
    Checksum,
    Data,
    Mmp,
    Delay,
}

impl From<ZioError> for SpaError {
    fn from(e: ZioError) -> SpaError {
        match e {
            ZioError::Io | ZioError::Mmp | ZioError::Delay => SpaError::Eio,
            ZioError::Checksum => SpaError::Ecksum,
            ZioError::Data => SpaError::Einval,
        }
    }
}

pub struct Zio {
    pub id: ZioId,
    pub kind: ZioType,
    pub priority: Priority,
    pub flags: ZioFlags,
    pub stage: ZioStage,
    pub bp: Option<Blkptr>,
    pub lsize: usize,
    pub data: Vec<u8>,
    pub checksum: Option<[u8; 32]>,
    pub parent: Option<ZioId>,
    pub children: Vec<ZioId>,
    waiting_children: usize,
    pub error: Option<ZioError>,
}

impl Zio {
    fn new(id: ZioId, kind: ZioType, priority: Priority, flags: ZioFlags, lsize: usize, data: Vec<u8>) -> Self {
        Zio {
            id,
            kind,
            priority,
            flags,
            stage: ZioStage::Open,
            bp: None,
            lsize,
            data,
            checksum: None,
            parent: None,
            children: Vec::new(),
            waiting_children: 0,
            error: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.stage == ZioStage::Done
    }

    /// A child only becomes eligible to run its `VdevIo` stage once its
    /// parent has finished issuing every sibling (`zio_ready`'s fan-out
    /// gate); here we just track whether every child this zio spawned has
    /// itself reached `Done` before this zio may advance out of `Assess`.
    fn children_done(&self, arena: &[Option<Zio>]) -> bool {
        self.children
            .iter()
            .all(|&c| arena[c].as_ref().map(|z| z.is_done()).unwrap_or(true))
    }
}

