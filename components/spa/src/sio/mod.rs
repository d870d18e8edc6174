use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Checksum algorithm selector stored in a block pointer's `cksum` field
/// (§3.1, §4.4). `Inherit`/`On` resolve to a concrete algorithm via
/// [`crate::config::SpaConfig::default_checksum`]; the rest name a specific
/// function dispatched by [`crate::checksum::dispatch`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum SIOChecksum {
    Inherit,
    On,
    Off,
    Label,
    GangHeader,
    Zilog,
    Fletcher2,
    Fletcher4,
    Sha256,
    Zilog2,
    NoParity,
    Sha512,
    Skein,
    Edonr,
    Blake3,
    Functions,
}

impl SIOChecksum {
    /// Whether this algorithm is considered cryptographically strong
    /// enough for dedup keying and encrypted-block authentication (§4.4).
    pub fn is_dedup_capable(self) -> bool {
        matches!(
            self,
            SIOChecksum::Sha256
                | SIOChecksum::Sha512
                | SIOChecksum::Skein
                | SIOChecksum::Edonr
                | SIOChecksum::Blake3
        )
    }
}

/// Compression algorithm selector stored in a block pointer's `comp` field
/// (§3.1, §4.4).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum SIOCompress {
    Inherit,
    On,
    Off,
    Lzjb,
    Empty,
    Gzip1,
    Gzip2,
    Gzip3,
    Gzip4,
    Gzip5,
    Gzip6,
    Gzip7,
    Gzip8,
    Gzip9,
    Zle,
    Lz4,
    Zstd,
    Functions,
}

impl SIOCompress {
    pub fn gzip_level(self) -> Option<u32> {
        let raw: u8 = self.into();
        let gzip1: u8 = SIOCompress::Gzip1.into();
        let gzip9: u8 = SIOCompress::Gzip9.into();
        if (gzip1..=gzip9).contains(&raw) {
            Some((raw - gzip1 + 1) as u32)
        } else {
            None
        }
    }
}
