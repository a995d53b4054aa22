//! Learned rank support: predict prefix counts instead of looking them up.
//!
//! A single-segment linear model is fit by least squares over coarse prefix
//! rank samples taken every `coarse_stride` bits. Each micro-block of
//! `micro_stride` bits stores an i32 residual correcting the prediction at
//! the micro-block start, so a query is prediction + residual + a popcount
//! tail over at most `max_tail_words` words.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::bitvec::{popcount_range, BitVector, BitVectorRef, RankSupport};
use crate::error::{Error, Result};
use crate::wavelet;

/// Strides and the bounded-touch budget of the learned backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearnedConfig {
    /// Distance in bits between coarse model samples.
    pub coarse_stride: usize,
    /// Distance in bits between residual corrections. Must divide
    /// `coarse_stride`.
    pub micro_stride: usize,
    /// Maximum number of 64-bit words the popcount tail is expected to
    /// touch. Exceeding it is observed, not an error.
    pub max_tail_words: usize,
}

impl Default for LearnedConfig {
    fn default() -> Self {
        Self {
            coarse_stride: 512,
            micro_stride: 32,
            max_tail_words: 2,
        }
    }
}

impl LearnedConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.micro_stride == 0
            || self.coarse_stride == 0
            || self.coarse_stride % self.micro_stride != 0
        {
            return Err(Error::InvalidStrides);
        }
        Ok(())
    }
}

/// Single-segment piecewise linear model over a monotone function.
///
/// A full PGM would segment greedily under an error bound; prefix ranks are
/// close enough to linear that one least-squares segment plus the residual
/// table already gives exact answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PgmModel {
    a: f64,
    b: f64,
}

impl PgmModel {
    /// Ordinary least squares over `(xs[i], ys[i])`. Falls back to the mean
    /// when the denominator degenerates.
    pub fn fit(xs: &[u64], ys: &[u64]) -> Self {
        if xs.is_empty() || xs.len() != ys.len() {
            return Self { a: 0.0, b: 0.0 };
        }

        let n = xs.len() as f64;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_x2 = 0.0;
        for (&x, &y) in xs.iter().zip(ys) {
            let (x, y) = (x as f64, y as f64);
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_x2 += x * x;
        }

        let denom = n * sum_x2 - sum_x * sum_x;
        if denom.abs() < 1e-10 {
            return Self {
                a: 0.0,
                b: sum_y / n,
            };
        }

        let a = (n * sum_xy - sum_x * sum_y) / denom;
        let b = (sum_y - a * sum_x) / n;
        Self { a, b }
    }

    /// Predicted prefix count at position `x`, rounded to the nearest
    /// integer. May be negative or overshoot the true value.
    pub fn predict(&self, x: usize) -> i64 {
        (self.a * x as f64 + self.b).round() as i64
    }
}

/// Bit vector answering `rank1` through the learned model.
///
/// Holds the same packed words as [`BitVector`] and agrees with it bit for
/// bit at every position.
#[derive(Debug)]
pub struct LearnedBitVector {
    n_bits: usize,
    num_ones: usize,
    words: Vec<u64>,
    model: PgmModel,
    residuals: Vec<i32>,
    coarse_stride: usize,
    micro_stride: usize,
    max_tail_words: usize,
    tail_overruns: AtomicU64,
}

impl LearnedBitVector {
    pub fn from_bits(bits: &[bool], config: LearnedConfig) -> Result<Self> {
        let mut words = vec![0u64; bits.len().div_ceil(64)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                words[i / 64] |= 1 << (i % 64);
            }
        }
        Self::from_words(words, bits.len(), config)
    }

    pub fn from_words(words: Vec<u64>, n_bits: usize, config: LearnedConfig) -> Result<Self> {
        config.validate()?;
        let coarse = config.coarse_stride;
        let micro = config.micro_stride;

        let num_ones = popcount_range(&words, 0, n_bits);

        // coarse samples (j * S, rank1(j * S)), including the endpoint
        let num_coarse_blocks = n_bits.div_ceil(coarse);
        let mut xs = Vec::with_capacity(num_coarse_blocks + 1);
        let mut ys = Vec::with_capacity(num_coarse_blocks + 1);
        let mut running = 0usize;
        for j in 0..=num_coarse_blocks {
            let pos = (j * coarse).min(n_bits);
            xs.push((j * coarse) as u64);
            ys.push(running as u64);
            if pos < n_bits {
                let next = ((j + 1) * coarse).min(n_bits);
                running += popcount_range(&words, pos, next);
            }
        }

        let model = PgmModel::fit(&xs, &ys);

        // residual per micro-block, relative to the prediction at the start
        // of the enclosing coarse block
        let micros_per_coarse = coarse / micro;
        let mut residuals = vec![0i32; num_coarse_blocks * micros_per_coarse];
        let mut true_rank = 0usize;
        for j in 0..num_coarse_blocks {
            let coarse_start = j * coarse;
            let predicted = model.predict(coarse_start);

            for m in 0..micros_per_coarse {
                let micro_start = coarse_start + m * micro;
                if micro_start >= n_bits {
                    break;
                }
                residuals[j * micros_per_coarse + m] = (true_rank as i64 - predicted) as i32;
                let micro_end = (micro_start + micro).min(n_bits);
                true_rank += popcount_range(&words, micro_start, micro_end);
            }
        }

        Ok(Self {
            n_bits,
            num_ones,
            words,
            model,
            residuals,
            coarse_stride: coarse,
            micro_stride: micro,
            max_tail_words: config.max_tail_words,
            tail_overruns: AtomicU64::new(0),
        })
    }

    /// Number of rank queries whose popcount tail exceeded the bounded-touch
    /// budget. Stays zero for the default strides.
    pub fn tail_overruns(&self) -> u64 {
        self.tail_overruns.load(Ordering::Relaxed)
    }
}

impl RankSupport for LearnedBitVector {
    fn num_bits(&self) -> usize {
        self.n_bits
    }

    fn get(&self, i: usize) -> bool {
        if i >= self.n_bits {
            return false;
        }
        (self.words[i / 64] >> (i % 64)) & 1 == 1
    }

    fn rank1(&self, i: usize) -> usize {
        if i == 0 {
            return 0;
        }
        if i >= self.n_bits {
            return self.num_ones;
        }

        let coarse_idx = i / self.coarse_stride;
        let coarse_start = coarse_idx * self.coarse_stride;
        let predicted = self.model.predict(coarse_start);

        let micro_idx = (i - coarse_start) / self.micro_stride;
        let micros_per_coarse = self.coarse_stride / self.micro_stride;
        let correction = self
            .residuals
            .get(coarse_idx * micros_per_coarse + micro_idx)
            .copied()
            .unwrap_or(0) as i64;

        let tail_start = coarse_start + micro_idx * self.micro_stride;
        // an empty tail (i on a micro boundary) touches no words
        let tail_words = if i > tail_start {
            (i - 1) / 64 - tail_start / 64 + 1
        } else {
            0
        };
        if tail_words > self.max_tail_words {
            // correctness first: complete the popcount, but surface the
            // broken bounded-touch guarantee
            self.tail_overruns.fetch_add(1, Ordering::Relaxed);
            log::trace!(
                "learned rank tail spans {tail_words} words at i = {i} (budget {})",
                self.max_tail_words
            );
        }
        let tail = popcount_range(&self.words, tail_start, i) as i64;

        (predicted + correction + tail).max(0) as usize
    }

    fn count_ones(&self) -> usize {
        self.num_ones
    }
}

/// Learned occurrence table: one [`LearnedBitVector`] per wavelet level,
/// answering symbol rank queries through the shared level walk.
#[derive(Debug)]
pub struct LearnedOccTable {
    levels: Vec<LearnedBitVector>,
    len: usize,
}

impl LearnedOccTable {
    /// Builds learned levels over the packed words of existing wavelet
    /// level bit vectors.
    pub fn from_levels(levels: &[BitVector], config: LearnedConfig) -> Result<Self> {
        let len = levels.first().map_or(0, |l| l.num_bits());
        let levels = levels
            .iter()
            .map(|l| LearnedBitVector::from_words(l.words().to_vec(), l.num_bits(), config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { levels, len })
    }

    /// As [`from_levels`](Self::from_levels), over borrowed views (used when
    /// reopening a container with the learned flag set).
    pub(crate) fn from_level_refs(
        levels: &[BitVectorRef<'_>],
        config: LearnedConfig,
    ) -> Result<Self> {
        let len = levels.first().map_or(0, |l| l.num_bits());
        let levels = levels
            .iter()
            .map(|l| LearnedBitVector::from_words(l.words().to_vec(), l.num_bits(), config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { levels, len })
    }

    /// Occurrences of `symbol` in the underlying sequence prefix `[0, i)`.
    pub fn rank(&self, symbol: u8, i: usize) -> usize {
        wavelet::rank_over(&self.levels, self.len, symbol, i)
    }

    pub fn levels(&self) -> &[LearnedBitVector] {
        &self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn agrees_with_sampled_rank() {
        let mut rng = ChaCha8Rng::seed_from_u64(123);
        let bits: Vec<bool> = (0..10_000).map(|_| rng.random_bool(0.5)).collect();

        let sampled = BitVector::from_bits(&bits);
        let learned = LearnedBitVector::from_bits(&bits, LearnedConfig::default()).unwrap();

        for i in 0..=bits.len() {
            assert_eq!(learned.rank1(i), sampled.rank1(i), "i = {i}");
        }
        assert_eq!(learned.count_ones(), sampled.count_ones());
        assert_eq!(learned.tail_overruns(), 0);
    }

    #[test]
    fn sparse_and_dense_extremes() {
        for density in [0.0, 0.01, 0.99, 1.0] {
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            let bits: Vec<bool> = (0..3000).map(|_| rng.random_bool(density)).collect();

            let sampled = BitVector::from_bits(&bits);
            let learned = LearnedBitVector::from_bits(&bits, LearnedConfig::default()).unwrap();

            for i in (0..=bits.len()).step_by(7) {
                assert_eq!(learned.rank1(i), sampled.rank1(i), "density {density}, i = {i}");
            }
        }
    }

    #[test]
    fn empty_input() {
        let learned = LearnedBitVector::from_bits(&[], LearnedConfig::default()).unwrap();
        assert_eq!(learned.rank1(0), 0);
        assert_eq!(learned.rank1(100), 0);
        assert_eq!(learned.count_ones(), 0);
    }

    #[test]
    fn shorter_than_one_coarse_block() {
        let bits = [true, false, true, true, false, true];
        let learned = LearnedBitVector::from_bits(&bits, LearnedConfig::default()).unwrap();
        let sampled = BitVector::from_bits(&bits);
        for i in 0..=bits.len() {
            assert_eq!(learned.rank1(i), sampled.rank1(i));
        }
    }

    #[test]
    fn wide_micro_stride_overruns_are_observed() {
        let config = LearnedConfig {
            coarse_stride: 1024,
            micro_stride: 512,
            max_tail_words: 2,
        };
        let bits = vec![true; 2048];
        let learned = LearnedBitVector::from_bits(&bits, config).unwrap();

        // a tail of nearly 512 bits spans far more than two words
        assert_eq!(learned.rank1(511), 511);
        assert!(learned.tail_overruns() > 0);
    }

    #[test]
    fn empty_tail_is_not_an_overrun() {
        // zero budget: any touched word counts as an overrun, so only the
        // empty-tail queries stay silent
        let config = LearnedConfig {
            coarse_stride: 512,
            micro_stride: 32,
            max_tail_words: 0,
        };
        let bits = vec![true; 256];
        let learned = LearnedBitVector::from_bits(&bits, config).unwrap();

        // i on a micro boundary that is not word-aligned: tail [32, 32) is empty
        assert_eq!(learned.rank1(32), 32);
        assert_eq!(learned.tail_overruns(), 0);
        assert_eq!(learned.rank1(96), 96);
        assert_eq!(learned.tail_overruns(), 0);

        // one bit past the boundary touches a word
        assert_eq!(learned.rank1(33), 33);
        assert_eq!(learned.tail_overruns(), 1);
    }

    #[test]
    fn invalid_strides_are_rejected() {
        let config = LearnedConfig {
            coarse_stride: 512,
            micro_stride: 48,
            max_tail_words: 2,
        };
        assert!(matches!(
            LearnedBitVector::from_bits(&[true], config),
            Err(Error::InvalidStrides)
        ));
    }

    #[test]
    fn degenerate_fit_falls_back_to_mean() {
        let model = PgmModel::fit(&[5], &[17]);
        assert_eq!(model.predict(5), 17);
        assert_eq!(model.predict(1000), 17);
    }

    proptest! {
        #[test]
        fn agrees_with_sampled_rank_random(
            bits in prop::collection::vec(any::<bool>(), 0..4000),
            coarse_exp in 7usize..11,
            micro_exp in 4usize..7
        ) {
            let config = LearnedConfig {
                coarse_stride: 1 << coarse_exp,
                micro_stride: 1 << micro_exp,
                max_tail_words: 2,
            };
            let sampled = BitVector::from_bits(&bits);
            let learned = LearnedBitVector::from_bits(&bits, config).unwrap();

            for i in (0..=bits.len()).step_by(11) {
                prop_assert_eq!(learned.rank1(i), sampled.rank1(i));
            }
        }
    }
}
