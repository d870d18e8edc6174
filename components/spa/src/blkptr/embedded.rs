//! "Embedded" block pointers (§3.1, §4.4): when the compressed payload fits
//! in the DVA+padding space (<= [`BPE_PAYLOAD_SIZE`] bytes, currently 112),
//! it is stored inline in the BP itself and no DVA is ever allocated. This
//! module packs/unpacks that payload into a [`Blkptr`]'s DVA words the way
//! `zfs_embedded_bp_fill`/`decode_embedded_bp_compressed` do, and defines
//! the gang header used when a block is too big to land in one contiguous
//! extent (§3.1 gang BP, §4.5 step 5).
use super::blkptr::{Blkptr, EmbeddedType};
use super::BPE_PAYLOAD_SIZE;
use sys::BitOptExt;

/// Packs `payload` (already compressed, `<= BPE_PAYLOAD_SIZE` bytes) into a
/// fresh embedded [`Blkptr`]. Returns `None` if the payload does not fit,
/// matching the "fall back to an ordinary allocated block" path callers
/// take on `Err`.
pub fn embed_payload(
    payload: &[u8],
    lsize: u64,
    etype: EmbeddedType,
    compress: u8,
) -> Option<Blkptr> {
    if payload.len() > BPE_PAYLOAD_SIZE {
        return None;
    }
    let mut bp = Blkptr::new();
    bp.set_embeded(1);
    bp.set_etype(etype as u64);
    bp.set_compress(compress as u64);
    bp.set_lsize(lsize);
    bp.set_psize(payload.len() as u64);

    let mut words = [0u8; BPE_PAYLOAD_SIZE];
    words[..payload.len()].copy_from_slice(payload);
    // Payload occupies DVA words 0-5, 7-9, b-f (everything except blk_prop
    // at word 6 and blk_birth at word a), mirrored by `is_payload_word`.
    let chunks: Vec<[u8; 8]> = words.chunks(8).map(|c| c.try_into().unwrap()).collect();
    for (i, chunk) in chunks.iter().enumerate().take(6) {
        bp.blk_dva[i / 2].dva_word[i % 2] = u64::from_le_bytes(*chunk);
    }
    if let Some(c) = chunks.get(6) {
        bp.blk_pad[0] = u64::from_le_bytes(*c);
    }
    if let Some(c) = chunks.get(7) {
        bp.blk_pad[1] = u64::from_le_bytes(*c);
    }
    if let Some(c) = chunks.get(8) {
        bp.blk_phys_birth = u64::from_le_bytes(*c);
    }
    for (i, chunk) in chunks.iter().enumerate().skip(9) {
        let word = &mut bp.blk_cksum.zc_word[(i - 9).min(3)];
        *word = u64::from_le_bytes(*chunk);
    }
    Some(bp)
}

/// Recovers the raw (still-compressed) payload bytes from an embedded
/// [`Blkptr`], trimmed to the PSIZE recorded at embed time.
pub fn extract_payload(bp: &Blkptr) -> Vec<u8> {
    assert!(bp.is_embedded());
    let psize = bp.get_psize() as usize;
    let mut words = [0u8; BPE_PAYLOAD_SIZE];
    for i in 0..6 {
        let chunk = bp.blk_dva[i / 2].dva_word[i % 2].to_le_bytes();
        words[i * 8..i * 8 + 8].copy_from_slice(&chunk);
    }
    words[48..56].copy_from_slice(&bp.blk_pad[0].to_le_bytes());
    words[56..64].copy_from_slice(&bp.blk_pad[1].to_le_bytes());
    words[64..72].copy_from_slice(&bp.blk_phys_birth.to_le_bytes());
    for i in 0..4 {
        words[72 + i * 8..72 + i * 8 + 8].copy_from_slice(&bp.blk_cksum.zc_word[i].to_le_bytes());
    }
    words[..psize.min(BPE_PAYLOAD_SIZE)].to_vec()
}

/// Maximum number of child block pointers a gang header can hold (§3.1).
pub const GANG_HEADER_MAX_CHILDREN: usize = 3;
/// On-disk size of a gang header block.
pub const GANG_HEADER_SIZE: usize = 512;

/// A gang header block's body: up to three child BPs for the pieces a
/// single contiguous allocation could not satisfy (§4.5 step 5).
#[derive(Debug, Clone)]
pub struct GangHeader {
    pub children: Vec<Blkptr>,
}

impl GangHeader {
    pub fn new() -> Self {
        GangHeader { children: Vec::new() }
    }

    pub fn push(&mut self, child: Blkptr) {
        assert!(self.children.len() < GANG_HEADER_MAX_CHILDREN);
        self.children.push(child);
    }

    /// Sum of the children's logical sizes; a gang allocation is only
    /// valid once this covers the originally requested logical size.
    pub fn logical_size(&self) -> u64 {
        self.children.iter().map(|c| c.get_lsize()).sum()
    }
}

impl Default for GangHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_payload_round_trips() {
        let payload = b"hello embedded world, this is tiny".to_vec();
        let bp = embed_payload(&payload, payload.len() as u64, EmbeddedType::Data, 0).unwrap();
        assert!(bp.is_embedded());
        assert_eq!(bp.get_asize(), 0);
        let back = extract_payload(&bp);
        assert_eq!(back, payload);
    }

    #[test]
    fn oversized_payload_does_not_embed() {
        let payload = vec![0xAAu8; BPE_PAYLOAD_SIZE + 1];
        assert!(embed_payload(&payload, payload.len() as u64, EmbeddedType::Data, 0).is_none());
    }

    #[test]
    fn gang_header_accumulates_logical_size() {
        let mut gh = GangHeader::new();
        let mut b1 = Blkptr::new();
        b1.set_lsize(4096);
        let mut b2 = Blkptr::new();
        b2.set_lsize(8192);
        gh.push(b1);
        gh.push(b2);
        assert_eq!(gh.logical_size(), 12288);
    }
}
