//! Fletcher-2/4 (§4.4): ZFS's own non-cryptographic, SIMD-friendly running
//! checksums, core-owned per `module/zcommon/zfs_fletcher.c` (not a "crypto
//! provider" function — these are pure arithmetic over the data stream with
//! no key material). Fletcher-4 is the default for plain data blocks
//! because it is far cheaper than a cryptographic hash while still strong
//! enough to catch bit-rot.
//!
//! Both operate on 32-bit little-endian words; a trailing partial word is
//! zero-padded, matching `fletcher_4_incremental_native` on an odd-sized
//! buffer.

/// Fletcher-2: four 64-bit running sums (a0,a1,b0,b1) over pairs of 64-bit
/// words.
pub fn fletcher2(data: &[u8]) -> [u8; 32] {
    let mut a0: u64 = 0;
    let mut a1: u64 = 0;
    let mut b0: u64 = 0;
    let mut b1: u64 = 0;

    for chunk in data.chunks(16) {
        let mut buf = [0u8; 16];
        buf[..chunk.len()].copy_from_slice(chunk);
        let w0 = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let w1 = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        a0 = a0.wrapping_add(w0);
        a1 = a1.wrapping_add(w1);
        b0 = b0.wrapping_add(a0);
        b1 = b1.wrapping_add(a1);
    }

    pack4(a0, a1, b0, b1)
}

/// Fletcher-4: four 64-bit running sums over 32-bit words, with the
/// running sum weighted by position (a -> b -> c -> d), matching
/// `fletcher_4_native`'s accumulation order.
pub fn fletcher4(data: &[u8]) -> [u8; 32] {
    let mut a: u64 = 0;
    let mut b: u64 = 0;
    let mut c: u64 = 0;
    let mut d: u64 = 0;

    for chunk in data.chunks(4) {
        let mut buf = [0u8; 4];
        buf[..chunk.len()].copy_from_slice(chunk);
        let w = u32::from_le_bytes(buf) as u64;
        a = a.wrapping_add(w);
        b = b.wrapping_add(a);
        c = c.wrapping_add(b);
        d = d.wrapping_add(c);
    }

    pack4(a, b, c, d)
}

fn pack4(w0: u64, w1: u64, w2: u64, w3: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[0..8].copy_from_slice(&w0.to_le_bytes());
    out[8..16].copy_from_slice(&w1.to_le_bytes());
    out[16..24].copy_from_slice(&w2.to_le_bytes());
    out[24..32].copy_from_slice(&w3.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fletcher4_is_deterministic_and_sensitive() {
        let a = fletcher4(b"the quick brown fox");
        let b = fletcher4(b"the quick brown fox");
        assert_eq!(a, b);
        let c = fletcher4(b"the quick brown fox.");
        assert_ne!(a, c);
    }

    #[test]
    fn fletcher2_handles_odd_length_input() {
        let a = fletcher2(b"13 bytes long");
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn empty_input_is_all_zero() {
        assert_eq!(fletcher4(b""), [0u8; 32]);
        assert_eq!(fletcher2(b""), [0u8; 32]);
    }
}
