//! Balanced binary wavelet tree over the byte alphabet.
//!
//! Eight bit-vector levels, one per byte bit from MSB (level 0) to LSB
//! (level 7). At each level the sequence is stably partitioned into the
//! zero-bit subsequence followed by the one-bit subsequence, which becomes
//! the sequence of the next level. `rank` and `access` descend the levels
//! maintaining a half-open interval resp. a position.

use rayon::prelude::*;

use crate::bitvec::{BitVector, BitVectorRef, RankSupport};

/// Levels of a byte wavelet tree, one per bit.
pub const NUM_LEVELS: usize = 8;

/// Owned wavelet tree over a byte sequence (here: the BWT).
#[derive(Debug, Clone)]
pub struct WaveletTree {
    levels: Vec<BitVector>,
    len: usize,
}

impl WaveletTree {
    /// Builds all eight levels from the given byte sequence.
    ///
    /// Partitioning is sequential (each level feeds the next), the rank
    /// indexes of the finished levels are built on the rayon pool.
    pub fn build(sequence: &[u8]) -> Self {
        let len = sequence.len();

        let mut level_words = Vec::with_capacity(NUM_LEVELS);
        let mut current = sequence.to_vec();

        for level in 0..NUM_LEVELS {
            let bit = (NUM_LEVELS - 1 - level) as u8;

            let mut words = vec![0u64; len.div_ceil(64)];
            let mut left = Vec::with_capacity(len);
            let mut right = Vec::with_capacity(len - len / 2);

            for (i, &symbol) in current.iter().enumerate() {
                if (symbol >> bit) & 1 == 1 {
                    words[i / 64] |= 1 << (i % 64);
                    right.push(symbol);
                } else {
                    left.push(symbol);
                }
            }

            level_words.push(words);

            if level + 1 < NUM_LEVELS {
                left.extend_from_slice(&right);
                current = left;
            }
        }

        let levels = level_words
            .into_par_iter()
            .map(|words| BitVector::from_words(words, len))
            .collect();

        Self { levels, len }
    }

    /// Occurrences of `symbol` in `sequence[0..i)`. Indices beyond the
    /// sequence length are clamped.
    pub fn rank(&self, symbol: u8, i: usize) -> usize {
        rank_over(&self.levels, self.len, symbol, i)
    }

    /// The symbol at position `i`, reassembled bit by bit. Out-of-range
    /// positions read as 0.
    pub fn access(&self, i: usize) -> u8 {
        access_over(&self.levels, self.len, i)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn levels(&self) -> &[BitVector] {
        &self.levels
    }

    pub(crate) fn level_refs(&self) -> [BitVectorRef<'_>; NUM_LEVELS] {
        core::array::from_fn(|i| self.levels[i].as_ref())
    }
}

/// The level descent for `rank`, shared by the sampled, borrowed and
/// learned backends.
pub(crate) fn rank_over<B: RankSupport>(levels: &[B], len: usize, symbol: u8, i: usize) -> usize {
    if i == 0 || len == 0 {
        return 0;
    }

    let mut lo = 0usize;
    let mut hi = i.min(len);

    for (level, bits) in levels.iter().enumerate() {
        let bit = (symbol >> (NUM_LEVELS - 1 - level)) & 1;

        if bit == 0 {
            lo = bits.rank0(lo);
            hi = bits.rank0(hi);
        } else {
            let zeros = bits.rank0(bits.num_bits());
            lo = zeros + bits.rank1(lo);
            hi = zeros + bits.rank1(hi);
        }

        if lo >= hi {
            return 0;
        }
    }

    hi - lo
}

pub(crate) fn access_over<B: RankSupport>(levels: &[B], len: usize, i: usize) -> u8 {
    if i >= len {
        return 0;
    }

    let mut symbol = 0u8;
    let mut pos = i;

    for (level, bits) in levels.iter().enumerate() {
        if bits.get(pos) {
            symbol |= 1 << (NUM_LEVELS - 1 - level);
            let zeros = bits.rank0(bits.num_bits());
            pos = zeros + bits.rank1(pos);
        } else {
            pos = bits.rank0(pos);
        }
    }

    symbol
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn naive_rank(sequence: &[u8], symbol: u8, i: usize) -> usize {
        sequence[..i.min(sequence.len())]
            .iter()
            .filter(|&&b| b == symbol)
            .count()
    }

    #[test]
    fn rank_and_access_small() {
        let bwt = b"annb$aa";
        let wt = WaveletTree::build(bwt);

        assert_eq!(wt.len(), 7);
        for i in 0..bwt.len() {
            assert_eq!(wt.access(i), bwt[i], "access({i})");
        }
        for &symbol in b"anb$x" {
            for i in 0..=bwt.len() {
                assert_eq!(wt.rank(symbol, i), naive_rank(bwt, symbol, i));
            }
        }
    }

    #[test]
    fn rank_edges() {
        let wt = WaveletTree::build(b"abracadabra");
        assert_eq!(wt.rank(b'a', 0), 0);
        // beyond-length indices clamp to the full sequence
        assert_eq!(wt.rank(b'a', 1000), 5);
        assert_eq!(wt.access(1000), 0);
    }

    #[test]
    fn empty_sequence() {
        let wt = WaveletTree::build(b"");
        assert!(wt.is_empty());
        assert_eq!(wt.rank(b'a', 0), 0);
        assert_eq!(wt.rank(b'a', 10), 0);
        assert_eq!(wt.access(0), 0);
    }

    #[test]
    fn full_byte_alphabet() {
        let sequence: Vec<u8> = (0..=255u8).chain(0..=255u8).collect();
        let wt = WaveletTree::build(&sequence);

        for symbol in [0u8, 1, 35, 36, 127, 128, 254, 255] {
            assert_eq!(wt.rank(symbol, sequence.len()), 2, "symbol {symbol}");
        }
        for i in (0..sequence.len()).step_by(37) {
            assert_eq!(wt.access(i), sequence[i]);
        }
    }

    proptest! {
        #[test]
        fn matches_naive(
            sequence in prop::collection::vec(any::<u8>(), 0..800),
            symbols in prop::collection::vec(any::<u8>(), 1..10),
            positions in prop::collection::vec(0usize..1000, 1..20)
        ) {
            let wt = WaveletTree::build(&sequence);

            for &symbol in &symbols {
                for &i in &positions {
                    prop_assert_eq!(wt.rank(symbol, i), naive_rank(&sequence, symbol, i));
                }
            }
            for &i in &positions {
                if i < sequence.len() {
                    prop_assert_eq!(wt.access(i), sequence[i]);
                }
            }
        }
    }
}
