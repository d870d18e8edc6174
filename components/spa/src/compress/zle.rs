//! ZLE: zero-length-encoding, a trivial run-length codec specialized for
//! the common case of large zero-filled regions (sparse files, freshly
//! allocated metadata), per `module/zcommon/zfs_zle.c` semantics. Each
//! record is a control byte followed by either that many literal bytes
//! (control < 64) or an implicit run of `control - 63` zero bytes
//! (control >= 64), capped at 64 zero bytes per run.
const MAX_LITERAL: usize = 64;
const MAX_RUN: usize = 64;

pub fn zle_compress(src: &[u8]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len());
    let mut i = 0usize;
    while i < src.len() {
        if src[i] == 0 {
            let mut run = 1;
            while run < MAX_RUN && i + run < src.len() && src[i + run] == 0 {
                run += 1;
            }
            dst.push((63 + run) as u8);
            i += run;
        } else {
            let mut len = 1;
            while len < MAX_LITERAL && i + len < src.len() && src[i + len] != 0 {
                len += 1;
            }
            dst.push((len - 1) as u8);
            dst.extend_from_slice(&src[i..i + len]);
            i += len;
        }
    }
    dst
}

pub fn zle_decompress(src: &[u8], dst_len: usize) -> Vec<u8> {
    let mut dst = Vec::with_capacity(dst_len);
    let mut i = 0usize;
    while dst.len() < dst_len && i < src.len() {
        let ctrl = src[i] as usize;
        i += 1;
        if ctrl >= 63 {
            let run = ctrl - 63;
            dst.extend(std::iter::repeat(0u8).take(run));
        } else {
            let len = ctrl + 1;
            dst.extend_from_slice(&src[i..i + len]);
            i += len;
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compresses_long_zero_runs() {
        let data = vec![0u8; 1000];
        let compressed = zle_compress(&data);
        assert!(compressed.len() < data.len() / 10);
        assert_eq!(zle_decompress(&compressed, data.len()), data);
    }

    #[test]
    fn round_trips_mixed_data() {
        let mut data = vec![1u8, 2, 3, 0, 0, 0, 0, 0, 9, 9];
        data.extend(vec![0u8; 200]);
        let compressed = zle_compress(&data);
        assert_eq!(zle_decompress(&compressed, data.len()), data);
    }
}
