//! Error kinds surfaced to callers of the pool (§7). Mirrors the `errno`
//! vocabulary `zfs`/`zpool` report, reduced to the subset the core itself
//! raises (device/VFS-specific codes like `EDQUOT`'s quota plumbing live
//! one layer up, but the *kind* is still part of the core's taxonomy since
//! the allocator and ZIO pipeline both need to be able to name it).
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SpaError {
    #[error("out of memory")]
    Enomem,
    #[error("out of space")]
    Enospc,
    #[error("I/O error")]
    Eio,
    #[error("checksum mismatch")]
    Ecksum,
    #[error("invalid argument")]
    Einval,
    #[error("busy")]
    Ebusy,
    #[error("pool is read-only or suspended")]
    Erofs,
    #[error("no such entry")]
    Enoent,
    #[error("entry already exists")]
    Eexist,
    #[error("quota exceeded")]
    Edquot,
    #[error("value too large")]
    Efbig,
    #[error("operation already in progress")]
    Einprogress,
    #[error("retry after the next txg advances")]
    Erestart,
}

pub type SpaResult<T> = Result<T, SpaError>;
