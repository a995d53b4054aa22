//! Cache-oblivious packing of wavelet-tree levels into page-sized
//! macroblocks.
//!
//! The first `top_k` levels are serialized inline (they are touched by every
//! query, so they share pages). Every remaining level starts at a 4 KiB
//! boundary in its own macroblock region, and the whole buffer is padded to
//! a 4 KiB multiple. Offsets are deterministic given the bit counts, so a
//! reader replays the layout walk and reconstructs zero-copy
//! [`BitVectorRef`] views straight out of an mmap'd buffer.

use crate::bitvec::{BitVector, BitVectorRef};
use crate::error::{Error, Result};

/// Macroblock size and alignment of the bottom levels.
pub const MACROBLOCK_BYTES: usize = 4096;

/// Number of levels serialized inline ahead of the macroblocks.
pub const TOP_LEVELS: usize = 2;

/// The packed buffer plus the per-level offset table.
#[derive(Debug, Clone)]
pub struct VebLayout {
    data: Vec<u8>,
    level_offsets: Vec<usize>,
    top_k: usize,
}

impl VebLayout {
    /// Packs the given levels. `top_k` levels go inline, the rest into
    /// 4 KiB-aligned macroblocks.
    pub fn build(levels: &[BitVector], top_k: usize) -> Self {
        let top_k = top_k.min(levels.len());

        let mut data = Vec::new();
        let mut level_offsets = vec![0usize; levels.len()];

        for (level, bits) in levels.iter().enumerate().take(top_k) {
            pad_to(&mut data, 8);
            level_offsets[level] = data.len();
            bits.write_into(&mut data);
        }

        for idx in bottom_order(levels.len() - top_k) {
            let level = top_k + idx;
            pad_to(&mut data, MACROBLOCK_BYTES);
            level_offsets[level] = data.len();
            levels[level].write_into(&mut data);
        }

        pad_to(&mut data, MACROBLOCK_BYTES);

        Self {
            data,
            level_offsets,
            top_k,
        }
    }

    /// Byte offset of the serialized header of level `level` inside
    /// [`data`](Self::data).
    pub fn level_offset(&self, level: usize) -> usize {
        self.level_offsets[level]
    }

    pub fn num_levels(&self) -> usize {
        self.level_offsets.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Reconstructs all level views from a packed buffer by replaying the
    /// layout walk of [`build`](Self::build).
    pub fn level_views(data: &[u8], num_levels: usize, top_k: usize) -> Result<Vec<BitVectorRef<'_>>> {
        let top_k = top_k.min(num_levels);
        let mut views = Vec::with_capacity(num_levels);
        let mut offset = 0usize;

        for level in 0..num_levels {
            let alignment = if level < top_k { 8 } else { MACROBLOCK_BYTES };
            offset = offset.next_multiple_of(alignment);
            if offset >= data.len() {
                return Err(Error::Format(format!(
                    "vEB buffer ends before level {level}"
                )));
            }
            let (view, consumed) = BitVectorRef::parse(&data[offset..])?;
            views.push(view);
            offset += consumed;
        }

        Ok(views)
    }
}

// The recursive split of the bottom levels degenerates to the identity
// permutation for a path-shaped level list, which keeps offsets stable
// across builds.
fn bottom_order(num_bottom: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(num_bottom);
    if num_bottom == 0 {
        return order;
    }
    if num_bottom == 1 {
        order.push(0);
        return order;
    }

    let mid = num_bottom / 2;
    order.extend(0..mid);
    order.extend(mid..num_bottom);
    order
}

fn pad_to(data: &mut Vec<u8>, alignment: usize) {
    let padded = data.len().next_multiple_of(alignment);
    data.resize(padded, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitvec::RankSupport;
    use crate::wavelet::{WaveletTree, NUM_LEVELS};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_wavelet(len: usize, seed: u64) -> WaveletTree {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let sequence: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        WaveletTree::build(&sequence)
    }

    #[test]
    fn bottom_levels_are_page_aligned() {
        let wt = random_wavelet(10_000, 1);
        let layout = VebLayout::build(wt.levels(), TOP_LEVELS);

        for level in TOP_LEVELS..NUM_LEVELS {
            assert_eq!(
                layout.level_offset(level) % MACROBLOCK_BYTES,
                0,
                "level {level}"
            );
        }
        assert_eq!(layout.len() % MACROBLOCK_BYTES, 0);
    }

    #[test]
    fn offsets_are_increasing_and_disjoint() {
        let wt = random_wavelet(5000, 2);
        let layout = VebLayout::build(wt.levels(), TOP_LEVELS);

        for level in 1..NUM_LEVELS {
            assert!(layout.level_offset(level) > layout.level_offset(level - 1));
        }
        assert!(layout.level_offset(NUM_LEVELS - 1) < layout.len());
    }

    #[test]
    fn views_round_trip() {
        let wt = random_wavelet(3000, 3);
        let layout = VebLayout::build(wt.levels(), TOP_LEVELS);
        let buf = crate::testutil::AlignedBuf::from_bytes(layout.data());

        let views = VebLayout::level_views(buf.as_bytes(), NUM_LEVELS, TOP_LEVELS).unwrap();
        assert_eq!(views.len(), NUM_LEVELS);

        for (view, level) in views.iter().zip(wt.levels()) {
            assert_eq!(view.num_bits(), level.num_bits());
            for i in (0..=level.num_bits()).step_by(101) {
                assert_eq!(view.rank1(i), level.rank1(i));
            }
        }

        // the replayed walk must agree with the offsets the builder recorded
        for level in 0..NUM_LEVELS {
            let offset = layout.level_offset(level);
            let (view, _) = BitVectorRef::parse(&buf.as_bytes()[offset..]).unwrap();
            assert_eq!(view.num_bits(), wt.levels()[level].num_bits());
        }
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let wt = random_wavelet(2000, 4);
        let layout = VebLayout::build(wt.levels(), TOP_LEVELS);
        let buf = crate::testutil::AlignedBuf::from_bytes(layout.data());
        let short = &buf.as_bytes()[..layout.len() - MACROBLOCK_BYTES];
        assert!(VebLayout::level_views(short, NUM_LEVELS, TOP_LEVELS).is_err());
    }

    #[test]
    fn all_levels_inline_when_top_k_covers_them() {
        let wt = random_wavelet(1000, 5);
        let layout = VebLayout::build(wt.levels(), NUM_LEVELS);
        let buf = crate::testutil::AlignedBuf::from_bytes(layout.data());
        let views = VebLayout::level_views(buf.as_bytes(), NUM_LEVELS, NUM_LEVELS).unwrap();
        assert_eq!(views.len(), NUM_LEVELS);
        assert_eq!(layout.len() % MACROBLOCK_BYTES, 0);
    }
}
