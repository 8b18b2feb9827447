//! Fixed-logical-size byte buffer backed by on-demand blocks.
//!
//! Block `k` covers logical bytes `[k*B, (k+1)*B)`; the last block may be
//! shorter. Residency is bounded by a configured maximum: allocating past the
//! budget evicts the least-recently-touched block and forgets its bytes.

use std::ops::Range;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::{ByteRanges, StorageError, StorageResult};

/// Byte buffer of a fixed logical size with bounded physical residency.
///
/// # Contract (normative)
/// - `write` may cross block boundaries; it splits across blocks and promotes
///   every touched block in LRU order.
/// - `has(start, end)` is true iff every byte of the range was written and
///   its block has not been evicted since.
/// - `slice` requires `has`; returned bytes are an owned copy, so eviction
///   can never invalidate a live slice.
/// - Evicting block `k` removes `[k*B, (k+1)*B)` from the filled set.
#[derive(Debug)]
pub struct BlockBuffer {
    size: u64,
    block_size: u64,
    max_blocks: Option<usize>,
    slabs: Vec<Option<Box<[u8]>>>,
    /// Resident block indices, least-recently-touched first.
    lru: Vec<usize>,
    filled: ByteRanges,
}

impl BlockBuffer {
    /// A single contiguous slab covering the whole logical size. No eviction
    /// ever occurs.
    #[must_use]
    pub fn contiguous(size: u64) -> Self {
        Self::build(size, size.max(1), None)
    }

    /// Block mode: `max_blocks` slabs of `block_size` bytes at most.
    #[must_use]
    pub fn with_blocks(size: u64, block_size: u64, max_blocks: usize) -> Self {
        debug_assert!(block_size > 0, "block size must be positive");
        debug_assert!(max_blocks > 0, "need at least one resident block");
        Self::build(size, block_size.max(1), Some(max_blocks.max(1)))
    }

    fn build(size: u64, block_size: u64, max_blocks: Option<usize>) -> Self {
        let block_count = usize::try_from(size.div_ceil(block_size)).unwrap_or(usize::MAX);
        Self {
            size,
            block_size,
            max_blocks,
            slabs: (0..block_count).map(|_| None).collect(),
            lru: Vec::new(),
            filled: ByteRanges::new(),
        }
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn resident_blocks(&self) -> usize {
        self.lru.len()
    }

    /// Byte ranges currently holding valid data.
    #[must_use]
    pub fn filled(&self) -> &ByteRanges {
        &self.filled
    }

    /// Whether `[start, end)` holds valid data.
    #[must_use]
    pub fn has(&self, start: u64, end: u64) -> bool {
        start <= end && self.filled.contains(start..end)
    }

    /// Copy `src` into logical range `[offset, offset + src.len())`.
    pub fn write(&mut self, src: &[u8], offset: u64) -> StorageResult<()> {
        let len = src.len() as u64;
        let end = offset
            .checked_add(len)
            .ok_or(StorageError::InvalidRange {
                start: offset,
                end: offset,
            })?;
        if end > self.size {
            return Err(StorageError::OutOfBounds {
                start: offset,
                end,
                size: self.size,
            });
        }
        if src.is_empty() {
            return Ok(());
        }

        let first_block = self.block_of(offset);
        let last_block = self.block_of(end - 1);
        for block in first_block..=last_block {
            self.ensure_resident(block, first_block..=last_block);

            let block_start = block as u64 * self.block_size;
            let copy_start = offset.max(block_start);
            let copy_end = end.min(block_start + self.block_size);
            let src_range = (copy_start - offset) as usize..(copy_end - offset) as usize;
            let dst_range = (copy_start - block_start) as usize..(copy_end - block_start) as usize;

            let slab = self.slabs[block]
                .as_mut()
                .unwrap_or_else(|| unreachable!("block {block} resident after ensure_resident"));
            slab[dst_range].copy_from_slice(&src[src_range]);
        }

        self.filled.insert(offset..end);
        Ok(())
    }

    /// Copy out `[start, end)`. The range must satisfy [`BlockBuffer::has`].
    pub fn slice(&mut self, start: u64, end: u64) -> StorageResult<Bytes> {
        if start > end {
            return Err(StorageError::InvalidRange { start, end });
        }
        if start == end {
            return Ok(Bytes::new());
        }
        if end > self.size {
            return Err(StorageError::OutOfBounds {
                start,
                end,
                size: self.size,
            });
        }
        if !self.filled.contains(start..end) {
            return Err(StorageError::NotBuffered { start, end });
        }

        let mut out = BytesMut::with_capacity((end - start) as usize);
        let first_block = self.block_of(start);
        let last_block = self.block_of(end - 1);
        for block in first_block..=last_block {
            let block_start = block as u64 * self.block_size;
            let copy_start = start.max(block_start);
            let copy_end = end.min(block_start + self.block_size);
            let slab = self.slabs[block]
                .as_ref()
                .ok_or(StorageError::NotBuffered { start, end })?;
            out.extend_from_slice(
                &slab[(copy_start - block_start) as usize..(copy_end - block_start) as usize],
            );
        }

        // Reading is a touch: keep hot blocks resident.
        for block in first_block..=last_block {
            self.promote(block);
        }

        Ok(out.freeze())
    }

    fn block_of(&self, offset: u64) -> usize {
        usize::try_from(offset / self.block_size).unwrap_or(usize::MAX)
    }

    fn block_range(&self, block: usize) -> Range<u64> {
        let start = block as u64 * self.block_size;
        start..(start + self.block_size).min(self.size)
    }

    fn promote(&mut self, block: usize) {
        if self.lru.last() == Some(&block) {
            return;
        }
        self.lru.retain(|&b| b != block);
        self.lru.push(block);
    }

    /// Allocate `block` if absent, evicting the least-recently-touched block
    /// when at the residency budget. Blocks in `keep` (the write currently in
    /// flight) are never evicted.
    fn ensure_resident(&mut self, block: usize, keep: std::ops::RangeInclusive<usize>) {
        if self.slabs[block].is_some() {
            self.promote(block);
            return;
        }

        if let Some(max) = self.max_blocks {
            while self.lru.len() >= max {
                let Some(pos) = self.lru.iter().position(|b| !keep.contains(b)) else {
                    break;
                };
                let victim = self.lru.remove(pos);
                let range = self.block_range(victim);
                trace!(block = victim, start = range.start, end = range.end, "evicting block");
                self.slabs[victim] = None;
                self.filled.remove(range);
            }
        }

        let len = (self.block_range(block).end - self.block_range(block).start) as usize;
        self.slabs[block] = Some(vec![0u8; len].into_boxed_slice());
        self.lru.push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_slice_round_trips() {
        let mut buf = BlockBuffer::contiguous(100);
        buf.write(b"hello world", 10).unwrap();
        assert!(buf.has(10, 21));
        assert_eq!(buf.slice(10, 21).unwrap(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn write_crossing_block_boundary_splits() {
        let mut buf = BlockBuffer::with_blocks(100, 10, 4);
        let data: Vec<u8> = (0..25).collect();
        buf.write(&data, 5).unwrap();

        assert!(buf.has(5, 30));
        assert_eq!(buf.slice(5, 30).unwrap().as_ref(), &data[..]);
        assert_eq!(buf.resident_blocks(), 3);
    }

    #[test]
    fn residency_never_exceeds_budget() {
        let mut buf = BlockBuffer::with_blocks(100, 10, 3);
        for block in 0..10u64 {
            buf.write(&[block as u8; 10], block * 10).unwrap();
            assert!(buf.resident_blocks() <= 3);
        }
    }

    #[test]
    fn eviction_forgets_filled_ranges() {
        let mut buf = BlockBuffer::with_blocks(40, 10, 2);
        buf.write(&[1; 10], 0).unwrap();
        buf.write(&[2; 10], 10).unwrap();
        assert!(buf.has(0, 10));

        // Third block evicts block 0 (least recently touched).
        buf.write(&[3; 10], 20).unwrap();
        assert!(!buf.has(0, 10));
        assert!(!buf.has(5, 12));
        assert!(buf.has(10, 30));
        assert!(buf.slice(0, 10).is_err());
    }

    #[test]
    fn touching_a_block_protects_it_from_eviction() {
        let mut buf = BlockBuffer::with_blocks(40, 10, 2);
        buf.write(&[1; 10], 0).unwrap();
        buf.write(&[2; 10], 10).unwrap();

        // Re-touch block 0 so block 1 becomes the LRU victim.
        buf.write(&[9; 2], 0).unwrap();
        buf.write(&[3; 10], 20).unwrap();

        assert!(buf.has(0, 10));
        assert!(!buf.has(10, 20));
    }

    #[test]
    fn spanning_write_does_not_evict_its_own_blocks() {
        let mut buf = BlockBuffer::with_blocks(40, 10, 2);
        buf.write(&[1; 10], 0).unwrap();

        // This write needs blocks 1 and 2; with a budget of 2 the eviction
        // must take block 0, not a block the write is filling.
        let data: Vec<u8> = (0..20).collect();
        buf.write(&data, 10).unwrap();
        assert!(buf.has(10, 30));
        assert_eq!(buf.slice(10, 30).unwrap().as_ref(), &data[..]);
    }

    #[test]
    fn contiguous_mode_never_evicts() {
        let mut buf = BlockBuffer::contiguous(1000);
        for i in 0..100u64 {
            buf.write(&[i as u8; 10], i * 10).unwrap();
        }
        assert!(buf.has(0, 1000));
        assert_eq!(buf.resident_blocks(), 1);
    }

    #[test]
    fn last_block_may_be_short() {
        let mut buf = BlockBuffer::with_blocks(25, 10, 3);
        buf.write(&[7; 5], 20).unwrap();
        assert!(buf.has(20, 25));
        assert_eq!(buf.slice(20, 25).unwrap(), Bytes::from_static(&[7; 5]));
    }

    #[test]
    fn write_past_end_is_rejected() {
        let mut buf = BlockBuffer::contiguous(10);
        let err = buf.write(&[0; 11], 0).unwrap_err();
        assert!(matches!(err, StorageError::OutOfBounds { .. }));
    }

    #[test]
    fn slice_of_unwritten_range_is_rejected() {
        let mut buf = BlockBuffer::contiguous(10);
        buf.write(&[1; 4], 0).unwrap();
        let err = buf.slice(0, 8).unwrap_err();
        assert_eq!(err, StorageError::NotBuffered { start: 0, end: 8 });
    }

    #[test]
    fn empty_write_and_slice_are_noops() {
        let mut buf = BlockBuffer::contiguous(10);
        buf.write(&[], 3).unwrap();
        assert_eq!(buf.slice(3, 3).unwrap(), Bytes::new());
        assert!(buf.filled().is_empty());
    }

    #[test]
    fn overwrites_return_latest_bytes() {
        let mut buf = BlockBuffer::with_blocks(30, 10, 3);
        buf.write(&[1; 20], 0).unwrap();
        buf.write(&[2; 10], 5).unwrap();

        let out = buf.slice(0, 20).unwrap();
        assert_eq!(&out[..5], &[1; 5]);
        assert_eq!(&out[5..15], &[2; 10]);
        assert_eq!(&out[15..], &[1; 5]);
    }
}
