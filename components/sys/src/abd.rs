//! Zero-copy scatter/gather buffer ("abd"), a portable stand-in for ARC
//! buffer data: either one contiguous allocation or a vector of chunks, with
//! the same flag vocabulary `abd_t` uses so callers can distinguish owned
//! vs. borrowed, linear vs. multi-chunk, and synthetic all-zero buffers.
use std::sync::Arc;

bitflags::bitflags! {
    pub struct AbdFlags: u32 {
        const OWNER       = 0x01;
        const LINEAR      = 0x02;
        const META        = 0x04;
        const MULTI_CHUNK = 0x08;
        const GANG        = 0x10;
        const ZEROS       = 0x20;
        const ALLOCD      = 0x40;
    }
}

enum Storage {
    /// Owned, contiguous allocation.
    LinearOwned(Vec<u8>),
    /// Borrowed view over memory owned elsewhere (e.g. a caller's buffer);
    /// returned to the caller via `return_buf` rather than freed.
    LinearBorrowed(Arc<Vec<u8>>, usize, usize),
    /// Scatter/gather over several independently-allocated chunks.
    MultiChunk(Vec<Vec<u8>>),
    /// A synthetic buffer that reads as `len` zero bytes without backing
    /// storage, used for hole reads.
    Zeros(usize),
}

pub struct Abd {
    storage: Storage,
    flags: AbdFlags,
}

impl Abd {
    pub fn alloc_linear(len: usize, is_metadata: bool) -> Self {
        let mut flags = AbdFlags::OWNER | AbdFlags::LINEAR | AbdFlags::ALLOCD;
        if is_metadata {
            flags |= AbdFlags::META;
        }
        Abd {
            storage: Storage::LinearOwned(vec![0u8; len]),
            flags,
        }
    }

    pub fn alloc_multi_chunk(chunk_sizes: &[usize]) -> Self {
        let chunks = chunk_sizes.iter().map(|&n| vec![0u8; n]).collect();
        Abd {
            storage: Storage::MultiChunk(chunks),
            flags: AbdFlags::OWNER | AbdFlags::MULTI_CHUNK | AbdFlags::ALLOCD,
        }
    }

    pub fn zeros(len: usize) -> Self {
        Abd {
            storage: Storage::Zeros(len),
            flags: AbdFlags::ZEROS,
        }
    }

    /// Borrow a sub-range of existing memory without copying or taking
    /// ownership; `return_buf` is implicit (the `Arc` is simply dropped).
    pub fn borrow(buf: Arc<Vec<u8>>, offset: usize, len: usize) -> Self {
        assert!(offset + len <= buf.len());
        Abd {
            storage: Storage::LinearBorrowed(buf, offset, len),
            flags: AbdFlags::LINEAR,
        }
    }

    pub fn is_gang(&self) -> bool {
        self.flags.contains(AbdFlags::GANG)
    }

    pub fn mark_gang(&mut self) {
        self.flags |= AbdFlags::GANG;
    }

    pub fn flags(&self) -> AbdFlags {
        self.flags
    }

    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::LinearOwned(v) => v.len(),
            Storage::LinearBorrowed(_, _, len) => *len,
            Storage::MultiChunk(chunks) => chunks.iter().map(|c| c.len()).sum(),
            Storage::Zeros(len) => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `f` once per backing chunk, in order, exposing each chunk's
    /// bytes. Mirrors `abd_iterate_func`.
    pub fn iterate(&self, mut f: impl FnMut(&[u8])) {
        match &self.storage {
            Storage::LinearOwned(v) => f(v),
            Storage::LinearBorrowed(buf, off, len) => f(&buf[*off..*off + *len]),
            Storage::MultiChunk(chunks) => {
                for c in chunks {
                    f(c);
                }
            }
            Storage::Zeros(len) => {
                const CHUNK: usize = 4096;
                let zeros = [0u8; CHUNK];
                let mut remaining = *len;
                while remaining > 0 {
                    let n = remaining.min(CHUNK);
                    f(&zeros[..n]);
                    remaining -= n;
                }
            }
        }
    }

    /// Gather the whole buffer into one contiguous `Vec<u8>`, copying if
    /// necessary (multi-chunk, borrowed, or zero-filled sources).
    pub fn copy_to_vec(&self) -> Vec<u8> {
        if let Storage::LinearOwned(v) = &self.storage {
            return v.clone();
        }
        let mut out = Vec::with_capacity(self.len());
        self.iterate(|chunk| out.extend_from_slice(chunk));
        out
    }

    /// Number of discrete chunks backing this abd.
    pub fn nchunks(&self) -> usize {
        match &self.storage {
            Storage::MultiChunk(chunks) => chunks.len(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_roundtrip() {
        let mut a = Abd::alloc_linear(8, false);
        if let Storage::LinearOwned(v) = &mut a.storage {
            v.copy_from_slice(b"deadbeef");
        }
        assert_eq!(a.copy_to_vec(), b"deadbeef");
    }

    #[test]
    fn multi_chunk_gathers_in_order() {
        let a = Abd::alloc_multi_chunk(&[2, 2]);
        assert_eq!(a.nchunks(), 2);
        assert_eq!(a.copy_to_vec(), vec![0u8; 4]);
    }

    #[test]
    fn zeros_have_no_backing_storage() {
        let a = Abd::zeros(10_000);
        assert_eq!(a.len(), 10_000);
        assert_eq!(a.copy_to_vec(), vec![0u8; 10_000]);
    }

    #[test]
    fn borrow_does_not_copy() {
        let buf = Arc::new(vec![1, 2, 3, 4, 5]);
        let a = Abd::borrow(buf.clone(), 1, 3);
        assert_eq!(a.copy_to_vec(), vec![2, 3, 4]);
    }
}
