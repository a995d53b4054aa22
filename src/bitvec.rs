//! Succinct bit vector with two-level sampled rank support.
//!
//! # Layout
//!
//! - `words[w]`: packed 64-bit words storing the raw bits (LSB = bit 0, so
//!   bit `i` of the vector is `(words[i / 64] >> (i % 64)) & 1`)
//! - `super_ranks[j]`: absolute rank1 at position `j * 2048` (u32)
//! - `sub_ranks[k]`: rank1 relative to the enclosing super-block at position
//!   `k * 256` (u16)
//!
//! `rank1(i)` counts 1-bits in the half-open interval `[0, i)` by adding the
//! super-block rank, the sub-block rank and a popcount over at most four
//! trailing words. All three arrays are fully determined by the bit count,
//! which makes the serialized form (`[n_bits u64][words][super][sub]`)
//! reconstructible as a zero-copy [`BitVectorRef`] view.

use crate::error::{Error, Result};

/// Bits covered by one absolute (u32) rank sample.
pub const SUPER_BLOCK_BITS: usize = 2048;

/// Bits covered by one relative (u16) rank sample.
pub const SUB_BLOCK_BITS: usize = 256;

const SUBS_PER_SUPER: usize = SUPER_BLOCK_BITS / SUB_BLOCK_BITS;
const WORD_BITS: usize = 64;

/// Read access shared by the sampled, borrowed and learned rank backends.
pub trait RankSupport {
    /// Logical number of bits.
    fn num_bits(&self) -> usize;

    /// Bit at position `i`. Out-of-range positions read as 0.
    fn get(&self, i: usize) -> bool;

    /// Number of 1-bits in `[0, i)`. Indices beyond the bit count are
    /// clamped, so `rank1(num_bits())` and larger return the total count.
    fn rank1(&self, i: usize) -> usize;

    /// Number of 0-bits in `[0, i)`, with the same clamping as `rank1`.
    fn rank0(&self, i: usize) -> usize {
        i.min(self.num_bits()) - self.rank1(i)
    }

    /// Total number of 1-bits.
    fn count_ones(&self) -> usize;
}

/// Owned bit vector with rank support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitVector {
    n_bits: usize,
    num_ones: usize,
    words: Vec<u64>,
    super_ranks: Vec<u32>,
    sub_ranks: Vec<u16>,
}

/// Borrowed view over a serialized bit vector, e.g. inside an mmap'd
/// container section or a vEB macroblock. Answers the same queries as
/// [`BitVector`] without copying the backing storage.
#[derive(Debug, Clone, Copy)]
pub struct BitVectorRef<'a> {
    n_bits: usize,
    num_ones: usize,
    words: &'a [u64],
    super_ranks: &'a [u32],
    sub_ranks: &'a [u16],
}

impl BitVector {
    /// Packs a slice of bits and builds the rank index.
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut words = vec![0u64; bits.len().div_ceil(WORD_BITS)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                words[i / WORD_BITS] |= 1 << (i % WORD_BITS);
            }
        }
        Self::from_words(words, bits.len())
    }

    /// Builds the rank index over pre-packed words.
    ///
    /// Missing trailing words are treated as zero; excess words beyond
    /// `n_bits` are truncated.
    pub fn from_words(mut words: Vec<u64>, n_bits: usize) -> Self {
        let required = n_bits.div_ceil(WORD_BITS);
        words.resize(required, 0);

        let (super_ranks, sub_ranks, num_ones) = build_rank_index(&words, n_bits);

        Self {
            n_bits,
            num_ones,
            words,
            super_ranks,
            sub_ranks,
        }
    }

    pub fn as_ref(&self) -> BitVectorRef<'_> {
        BitVectorRef {
            n_bits: self.n_bits,
            num_ones: self.num_ones,
            words: &self.words,
            super_ranks: &self.super_ranks,
            sub_ranks: &self.sub_ranks,
        }
    }

    pub(crate) fn words(&self) -> &[u64] {
        &self.words
    }

    pub(crate) fn super_ranks(&self) -> &[u32] {
        &self.super_ranks
    }

    pub(crate) fn sub_ranks(&self) -> &[u16] {
        &self.sub_ranks
    }

    /// Byte length of the serialized form for a given bit count.
    pub(crate) fn serialized_len(n_bits: usize) -> usize {
        8 + n_bits.div_ceil(WORD_BITS) * 8
            + n_bits.div_ceil(SUPER_BLOCK_BITS) * 4
            + n_bits.div_ceil(SUB_BLOCK_BITS) * 2
    }

    /// Appends `[n_bits u64][words][super_ranks][sub_ranks]`, little-endian.
    pub(crate) fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.n_bits as u64).to_le_bytes());
        for &word in &self.words {
            out.extend_from_slice(&word.to_le_bytes());
        }
        for &r in &self.super_ranks {
            out.extend_from_slice(&r.to_le_bytes());
        }
        for &r in &self.sub_ranks {
            out.extend_from_slice(&r.to_le_bytes());
        }
    }
}

impl<'a> BitVectorRef<'a> {
    /// Reconstructs a view from a buffer beginning with the serialized form.
    ///
    /// The buffer start must be 8-byte aligned in memory for the zero-copy
    /// word cast to succeed. Returns the view and the number of bytes it
    /// spans inside `bytes`.
    pub fn parse(bytes: &'a [u8]) -> Result<(Self, usize)> {
        if bytes.len() < 8 {
            return Err(Error::Format("bit vector header truncated".into()));
        }
        let n_bits = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;

        let num_words = n_bits.div_ceil(WORD_BITS);
        let num_supers = n_bits.div_ceil(SUPER_BLOCK_BITS);
        let num_subs = n_bits.div_ceil(SUB_BLOCK_BITS);
        let total = Self::check_len(bytes.len(), n_bits)?;

        let words_end = 8 + num_words * 8;
        let supers_end = words_end + num_supers * 4;

        let words: &[u64] = bytemuck::try_cast_slice(&bytes[8..words_end])
            .map_err(|_| Error::Format("misaligned bit vector words".into()))?;
        let super_ranks: &[u32] = bytemuck::try_cast_slice(&bytes[words_end..supers_end])
            .map_err(|_| Error::Format("misaligned super-block ranks".into()))?;
        let sub_ranks: &[u16] = bytemuck::try_cast_slice(&bytes[supers_end..total])
            .map_err(|_| Error::Format("misaligned sub-block ranks".into()))?;

        let mut view = Self {
            n_bits,
            num_ones: 0,
            words,
            super_ranks,
            sub_ranks,
        };
        view.num_ones = view.derive_count_ones();

        Ok((view, total))
    }

    /// Assembles a view from already-split arrays and a known total count,
    /// skipping any derivation work (container query path).
    pub(crate) fn from_raw_parts(
        n_bits: usize,
        num_ones: usize,
        words: &'a [u64],
        super_ranks: &'a [u32],
        sub_ranks: &'a [u16],
    ) -> Self {
        Self {
            n_bits,
            num_ones,
            words,
            super_ranks,
            sub_ranks,
        }
    }

    /// Assembles a view from already-split arrays (container wavelet section).
    pub(crate) fn from_parts(
        n_bits: usize,
        words: &'a [u64],
        super_ranks: &'a [u32],
        sub_ranks: &'a [u16],
    ) -> Self {
        let mut view = Self {
            n_bits,
            num_ones: 0,
            words,
            super_ranks,
            sub_ranks,
        };
        view.num_ones = view.derive_count_ones();
        view
    }

    fn check_len(available: usize, n_bits: usize) -> Result<usize> {
        let total = BitVector::serialized_len(n_bits);
        if available < total {
            return Err(Error::Format(format!(
                "bit vector truncated: need {total} bytes, have {available}"
            )));
        }
        Ok(total)
    }

    pub(crate) fn words(&self) -> &'a [u64] {
        self.words
    }

    // The total count follows from the last super-block sample plus a
    // bounded tail popcount, so clamped rank queries stay O(1).
    fn derive_count_ones(&self) -> usize {
        if self.n_bits == 0 {
            return 0;
        }
        let last_super = (self.n_bits - 1) / SUPER_BLOCK_BITS;
        self.super_ranks[last_super] as usize
            + popcount_range(self.words, last_super * SUPER_BLOCK_BITS, self.n_bits)
    }
}

macro_rules! impl_rank_support {
    ($type:ty) => {
        impl RankSupport for $type {
            fn num_bits(&self) -> usize {
                self.n_bits
            }

            fn get(&self, i: usize) -> bool {
                if i >= self.n_bits {
                    return false;
                }
                (self.words[i / WORD_BITS] >> (i % WORD_BITS)) & 1 == 1
            }

            fn rank1(&self, i: usize) -> usize {
                if i == 0 {
                    return 0;
                }
                if i >= self.n_bits {
                    return self.num_ones;
                }

                let super_idx = i / SUPER_BLOCK_BITS;
                let mut rank = self.super_ranks[super_idx] as usize;

                let offset_in_super = i - super_idx * SUPER_BLOCK_BITS;
                if offset_in_super == 0 {
                    return rank;
                }

                let sub_offset = offset_in_super / SUB_BLOCK_BITS;
                let sub_idx = super_idx * SUBS_PER_SUPER + sub_offset;
                if sub_idx < self.sub_ranks.len() {
                    rank += self.sub_ranks[sub_idx] as usize;
                }

                let sub_start = super_idx * SUPER_BLOCK_BITS + sub_offset * SUB_BLOCK_BITS;
                if i == sub_start {
                    return rank;
                }

                rank + popcount_range(&self.words, sub_start, i)
            }

            fn count_ones(&self) -> usize {
                self.num_ones
            }
        }
    };
}

impl_rank_support!(BitVector);
impl_rank_support!(BitVectorRef<'_>);

fn build_rank_index(words: &[u64], n_bits: usize) -> (Vec<u32>, Vec<u16>, usize) {
    let num_supers = n_bits.div_ceil(SUPER_BLOCK_BITS);
    let num_subs = n_bits.div_ceil(SUB_BLOCK_BITS);

    let mut super_ranks = Vec::with_capacity(num_supers);
    let mut sub_ranks = Vec::with_capacity(num_subs);

    let mut running = 0usize;

    for super_idx in 0..num_supers {
        super_ranks.push(running as u32);

        let super_start = super_idx * SUPER_BLOCK_BITS;
        let super_end = (super_start + SUPER_BLOCK_BITS).min(n_bits);
        let mut local = 0usize;

        for sub_offset in 0..SUBS_PER_SUPER {
            let sub_start = super_start + sub_offset * SUB_BLOCK_BITS;
            if sub_start >= n_bits {
                break;
            }

            sub_ranks.push(local as u16);

            let sub_end = (sub_start + SUB_BLOCK_BITS).min(super_end);
            let pop = popcount_range(words, sub_start, sub_end);
            local += pop;
            running += pop;
        }
    }

    (super_ranks, sub_ranks, running)
}

/// Popcount of the bit range `[start, end)` within packed words.
///
/// Trims partial words at both ends. A trim shift can never reach the word
/// width here because a full-word trim means the word is skipped entirely,
/// except for the tail mask, which goes through [`low_mask`].
pub(crate) fn popcount_range(words: &[u64], start: usize, end: usize) -> usize {
    if start >= end {
        return 0;
    }
    let first = start / WORD_BITS;
    let last = (end - 1) / WORD_BITS;

    let mut total = 0usize;
    for w in first..=last {
        if w >= words.len() {
            break;
        }
        let base = w * WORD_BITS;
        let mut word = words[w];
        if base < start {
            word &= !0u64 << (start - base);
        }
        if base + WORD_BITS > end {
            word &= low_mask(end - base);
        }
        total += word.count_ones() as usize;
    }
    total
}

/// Mask keeping the lowest `bits` bits. A width-sized shift is undefined, so
/// `bits >= 64` maps to the all-ones constant.
pub(crate) fn low_mask(bits: usize) -> u64 {
    if bits >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
