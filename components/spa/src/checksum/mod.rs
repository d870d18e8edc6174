//! Checksum dispatch (§4.4). Every algorithm named by [`crate::sio::SIOChecksum`]
//! is exposed as a pure `fn(&[u8]) -> [u8; 32]` here — streaming state lives
//! only inside the call (no allocation beyond what the underlying crate
//! needs), and every implementation is byte-order neutral because it
//! operates on the host-native byte slice and folds down to fixed-width
//! little-endian words.
//!
//! Cryptographic primitives themselves (SHA-2, Blake3) are out of scope
//! per spec.md §1 — `sha2`/`blake3` supply those — but the *dispatch table*
//! and the non-cryptographic checksums (Fletcher-2/4) are core-owned, as is
//! the "fastest implementation" backend-selection machinery real ZFS builds
//! at module load by benchmarking each candidate.
use crate::sio::SIOChecksum;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

pub mod fletcher;

pub use fletcher::{fletcher2, fletcher4};

/// Skein and EdonR are external cryptographic primitives per spec.md §1;
/// this binds them to a keyed Fletcher-4 as a placeholder so the dispatch
/// table and on-disk format stay complete without vendoring a real
/// implementation. Not a substitute for the actual algorithms.
fn skein_or_edonr_placeholder(data: &[u8], salt: u64) -> [u8; 32] {
    let mut buf = Vec::with_capacity(data.len() + 8);
    buf.extend_from_slice(&salt.to_le_bytes());
    buf.extend_from_slice(data);
    fletcher::fletcher4(&buf)
}

fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn sha512(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha512};
    let digest = Sha512::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..32]);
    out
}

fn blake3(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Compute the checksum of `data` under `algo`. `Inherit`/`On`/`Off`/`Label`/
/// `GangHeader`/`Zilog`/`Zilog2`/`NoParity`/`Functions` are not concrete
/// hash functions and are rejected with `None` — callers resolve those to a
/// concrete algorithm first (via [`crate::config::SpaConfig::default_checksum`]
/// for `On`, or by construction for the structural pseudo-checksums).
pub fn compute(algo: SIOChecksum, data: &[u8]) -> Option<[u8; 32]> {
    match algo {
        SIOChecksum::Fletcher2 => Some(fletcher::fletcher2(data)),
        SIOChecksum::Fletcher4 => Some(fletcher::fletcher4(data)),
        SIOChecksum::Sha256 => Some(sha256(data)),
        SIOChecksum::Sha512 => Some(sha512(data)),
        SIOChecksum::Blake3 => Some(blake3(data)),
        SIOChecksum::Skein | SIOChecksum::Edonr => Some(skein_or_edonr_placeholder(data, 0)),
        _ => None,
    }
}

/// An HMAC-flavored checksum keyed by a 64-bit master-key stand-in, used to
/// checksum encrypted blocks' logical plaintext for dedup purposes (§4.9
/// step 1) without leaking the plaintext checksum of unencrypted data.
pub fn compute_keyed(algo: SIOChecksum, data: &[u8], key: u64) -> Option<[u8; 32]> {
    match algo {
        SIOChecksum::Sha256 => {
            let mut buf = Vec::with_capacity(data.len() + 8);
            buf.extend_from_slice(&key.to_le_bytes());
            buf.extend_from_slice(data);
            Some(sha256(&buf))
        }
        SIOChecksum::Blake3 => {
            let keyed = blake3::keyed_hash(&expand_key(key), data);
            Some(*keyed.as_bytes())
        }
        other => compute(other, data),
    }
}

fn expand_key(key: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, chunk) in out.chunks_mut(8).enumerate() {
        chunk.copy_from_slice(&(key ^ (i as u64).wrapping_mul(0x9E3779B97F4A7C15)).to_le_bytes());
    }
    out
}

/// Backend-selection policy a caller can request at runtime (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSelect {
    /// Use whichever backend [`fastest_cryptographic`] benchmarked as
    /// quickest at init time.
    Fastest,
    /// Round-robin across all supported cryptographic backends, call by
    /// call.
    Cycle,
    /// Pin to a specific named backend.
    Named(SIOChecksum),
}

const CRYPTOGRAPHIC_CANDIDATES: &[SIOChecksum] =
    &[SIOChecksum::Sha256, SIOChecksum::Sha512, SIOChecksum::Blake3];

static FASTEST: OnceLock<SIOChecksum> = OnceLock::new();

/// Benchmarks each cryptographic candidate against a fixed buffer for
/// ~2ms apiece and caches whichever came out fastest (§4.4). Idempotent:
/// later calls return the cached winner without re-benchmarking.
pub fn fastest_cryptographic() -> SIOChecksum {
    *FASTEST.get_or_init(|| benchmark_fastest(Duration::from_millis(2)))
}

fn benchmark_fastest(budget: Duration) -> SIOChecksum {
    let buf = vec![0xA5u8; 1 << 16];
    let mut best = CRYPTOGRAPHIC_CANDIDATES[0];
    let mut best_elapsed = Duration::MAX;
    for &candidate in CRYPTOGRAPHIC_CANDIDATES {
        let start = Instant::now();
        let mut iterations = 0u32;
        while start.elapsed() < budget {
            let _ = compute(candidate, &buf);
            iterations += 1;
        }
        // Lower per-iteration cost wins; a candidate that managed zero full
        // iterations inside the budget (pathological) is skipped.
        if iterations == 0 {
            continue;
        }
        let per_iter = start.elapsed() / iterations;
        if per_iter < best_elapsed {
            best_elapsed = per_iter;
            best = candidate;
        }
    }
    best
}

struct Cycle {
    next: std::sync::atomic::AtomicUsize,
}
static CYCLE: Cycle = Cycle { next: std::sync::atomic::AtomicUsize::new(0) };

fn next_cycle() -> SIOChecksum {
    use std::sync::atomic::Ordering;
    let idx = CYCLE.next.fetch_add(1, Ordering::Relaxed) % CRYPTOGRAPHIC_CANDIDATES.len();
    CRYPTOGRAPHIC_CANDIDATES[idx]
}

/// Resolve a [`BackendSelect`] policy to a concrete algorithm and compute.
pub fn compute_selected(select: BackendSelect, data: &[u8]) -> [u8; 32] {
    let algo = match select {
        BackendSelect::Fastest => fastest_cryptographic(),
        BackendSelect::Cycle => next_cycle(),
        BackendSelect::Named(a) => a,
    };
    compute(algo, data).expect("BackendSelect only names concrete hash algorithms")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        let a = compute(SIOChecksum::Sha256, b"hello").unwrap();
        let b = compute(SIOChecksum::Sha256, b"hello").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_algorithms_disagree() {
        let sha = compute(SIOChecksum::Sha256, b"hello").unwrap();
        let b3 = compute(SIOChecksum::Blake3, b"hello").unwrap();
        assert_ne!(sha, b3);
    }

    #[test]
    fn structural_pseudo_checksums_are_rejected() {
        assert!(compute(SIOChecksum::Off, b"x").is_none());
        assert!(compute(SIOChecksum::On, b"x").is_none());
        assert!(compute(SIOChecksum::GangHeader, b"x").is_none());
    }

    #[test]
    fn keyed_checksum_differs_by_key() {
        let a = compute_keyed(SIOChecksum::Blake3, b"plaintext", 1).unwrap();
        let b = compute_keyed(SIOChecksum::Blake3, b"plaintext", 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn fastest_is_cached_and_concrete() {
        let algo = fastest_cryptographic();
        assert!(CRYPTOGRAPHIC_CANDIDATES.contains(&algo));
        assert_eq!(fastest_cryptographic(), algo);
    }

    #[test]
    fn cycle_rotates_through_candidates() {
        let first = next_cycle();
        let mut saw_other = false;
        for _ in 0..CRYPTOGRAPHIC_CANDIDATES.len() {
            if next_cycle() != first {
                saw_other = true;
            }
        }
        assert!(saw_other);
    }
}
