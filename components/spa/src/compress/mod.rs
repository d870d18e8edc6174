//! Compression codecs (§4.4). Each codec operates on an in-memory buffer
//! and fails cleanly (`None`) if the compressed output would not fit in
//! the caller's reserved space, so the ZIO pipeline's `WRITE_COMPRESS`
//! stage can fall back to storing the block uncompressed rather than
//! erroring.
use crate::sio::SIOCompress;

mod lzjb;
mod zle;

pub use lzjb::{lzjb_compress, lzjb_decompress};
pub use zle::{zle_compress, zle_decompress};

/// Compress `data` under `algo`, succeeding only if the result is no
/// larger than `reserved` bytes (the space the caller has allocated for
/// the physical block). `Off`/`Empty` (a zero-length block) and `Inherit`/
/// `On`/`Functions` are not concrete codecs; callers resolve those first.
pub fn compress(algo: SIOCompress, data: &[u8], reserved: usize) -> Option<Vec<u8>> {
    let out = match algo {
        SIOCompress::Lzjb => lzjb::lzjb_compress(data),
        SIOCompress::Zle => zle::zle_compress(data),
        SIOCompress::Lz4 => lz4_flex::compress_prepend_size(data),
        SIOCompress::Zstd => {
            zstd::bulk::compress(data, 3).ok()?
        }
        g if g.gzip_level().is_some() => {
            use flate2::write::GzEncoder;
            use flate2::Compression;
            use std::io::Write;
            let level = g.gzip_level().unwrap();
            let mut enc = GzEncoder::new(Vec::new(), Compression::new(level));
            enc.write_all(data).ok()?;
            enc.finish().ok()?
        }
        _ => return None,
    };
    if out.len() > reserved {
        None
    } else {
        Some(out)
    }
}

/// Decompress a block of `psize` compressed bytes back to `lsize` logical
/// bytes under `algo`.
pub fn decompress(algo: SIOCompress, data: &[u8], lsize: usize) -> Option<Vec<u8>> {
    match algo {
        SIOCompress::Lzjb => Some(lzjb::lzjb_decompress(data, lsize)),
        SIOCompress::Zle => Some(zle::zle_decompress(data, lsize)),
        SIOCompress::Lz4 => lz4_flex::decompress_size_prepended(data).ok(),
        SIOCompress::Zstd => zstd::bulk::decompress(data, lsize).ok(),
        g if g.gzip_level().is_some() => {
            use flate2::read::GzDecoder;
            use std::io::Read;
            let mut dec = GzDecoder::new(data);
            let mut out = Vec::with_capacity(lsize);
            dec.read_to_end(&mut out).ok()?;
            Some(out)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_round_trips() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaabbbbbbbbbbbbbbbbbbbbbbbbbb";
        let compressed = compress(SIOCompress::Lz4, data, data.len()).unwrap();
        let back = decompress(SIOCompress::Lz4, &compressed, data.len()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn gzip_round_trips() {
        let data = vec![7u8; 4096];
        let compressed = compress(SIOCompress::Gzip6, &data, data.len()).unwrap();
        assert!(compressed.len() < data.len());
        let back = decompress(SIOCompress::Gzip6, &compressed, data.len()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn incompressible_over_reserved_falls_back() {
        let data: Vec<u8> = (0..256u32).map(|i| (i * 37) as u8).collect();
        // A reservation smaller than any possible compressed output forces
        // the "store uncompressed" fallback path the ZIO pipeline takes.
        assert!(compress(SIOCompress::Gzip1, &data, 1).is_none());
    }

    #[test]
    fn structural_variants_are_not_codecs() {
        assert!(compress(SIOCompress::Off, b"x", 100).is_none());
        assert!(compress(SIOCompress::On, b"x", 100).is_none());
    }
}
