//! # csidx — compressed full-text self-index
//!
//! A static FM-index over byte texts: build once from a sentinel-terminated
//! text, then answer `count`, `locate` and `extract` queries in time
//! sublinear in the text length.
//!
//! The index composes bottom-up from a two-level sampled rank
//! [bit vector](bitvec::BitVector), an eight-level binary
//! [wavelet tree](wavelet::WaveletTree) over the BWT, the cumulative count
//! table and a sampled suffix array. Two optional backends sit on top: a
//! [learned rank](learned::LearnedBitVector) variant predicting prefix
//! counts through a linear model, and a [vEB packing](veb::VebLayout) of the
//! wavelet levels into page-aligned macroblocks.
//!
//! A built index can be [saved](FmIndex::save) into a section-framed
//! container file and reopened zero-copy via [`MappedIndex`].
//!
//! ```no_run
//! use csidx::FmIndexConfig;
//!
//! let index = FmIndexConfig::new().build(b"banana$".as_slice())?;
//! assert_eq!(index.count(b"ana"), 2);
//! let mut positions = index.locate(b"ana", usize::MAX)?;
//! positions.sort_unstable();
//! assert_eq!(positions, [1, 3]);
//! # Ok::<(), csidx::Error>(())
//! ```

pub mod bitvec;
pub mod config;
pub mod container;
pub mod error;
pub mod learned;
pub mod veb;
pub mod wavelet;

mod construction;
mod sampled_suffix_array;

pub use config::FmIndexConfig;
pub use container::MappedIndex;
pub use error::{Error, Result};
pub use sampled_suffix_array::SampledSuffixArray;

use std::path::Path;

use bitvec::BitVectorRef;
use learned::LearnedOccTable;
use veb::VebLayout;
use wavelet::{WaveletTree, NUM_LEVELS};

/// An immutable FM-index over a byte text.
///
/// Built once by [`build_from_text`](Self::build_from_text) (or through
/// [`FmIndexConfig::build`]), queryable afterwards. All query methods are
/// pure reads and may be called from multiple threads without
/// synchronization.
pub struct FmIndex {
    text: Vec<u8>,
    bwt: Vec<u8>,
    count_table: Vec<u32>,
    wavelet: WaveletTree,
    suffix_array_samples: SampledSuffixArray,
    learned: Option<LearnedOccTable>,
    veb: Option<VebLayout>,
    config: FmIndexConfig,
}

impl FmIndex {
    /// Builds the index: suffix array, BWT, count table, wavelet tree,
    /// suffix array samples, plus the configured optional backends.
    ///
    /// The text must end with a sentinel byte that occurs nowhere else in
    /// it. A sentinel that is not also strictly smaller than every other
    /// byte is accepted with a warning; patterns containing the sentinel
    /// byte then give rotation-based answers.
    pub fn build_from_text(text: impl Into<Vec<u8>>, config: FmIndexConfig) -> Result<Self> {
        let text = text.into();

        validate_text(&text)?;
        if config.suffix_array_sampling_rate == 0 {
            return Err(Error::InvalidSamplingRate);
        }
        config.learned.validate()?;

        log::debug!("building index for {} bytes", text.len());

        let frequencies = construction::byte_frequencies(&text);
        let count_table = construction::cumulative_counts(&frequencies);

        let (bwt, suffix_array_samples) = if text.len() <= i32::MAX as usize {
            construction::bwt_and_samples::<i32>(
                &text,
                &frequencies,
                config.suffix_array_sampling_rate,
            )
        } else {
            construction::bwt_and_samples::<i64>(
                &text,
                &frequencies,
                config.suffix_array_sampling_rate,
            )
        };

        let wavelet = WaveletTree::build(&bwt);

        let learned = if config.learned_occ {
            Some(LearnedOccTable::from_levels(wavelet.levels(), config.learned)?)
        } else {
            None
        };

        let veb = config
            .veb_layout
            .then(|| VebLayout::build(wavelet.levels(), veb::TOP_LEVELS));

        log::debug!(
            "index ready: n = {}, sampling rate = {}, flags = {:#x}",
            text.len(),
            config.suffix_array_sampling_rate,
            config.flags()
        );

        Ok(Self {
            text,
            bwt,
            count_table,
            wavelet,
            suffix_array_samples,
            learned,
            veb,
            config,
        })
    }

    /// Number of occurrences of `pattern` in the text.
    ///
    /// An empty pattern returns the text length by backward-search
    /// convention; this is not an occurrence count of the empty string.
    pub fn count(&self, pattern: &[u8]) -> usize {
        self.view().count(pattern)
    }

    /// Text positions where `pattern` occurs, at most `limit` of them, in
    /// BWT interval order. A pattern without occurrences yields an empty
    /// vector, which is not an error.
    pub fn locate(&self, pattern: &[u8], limit: usize) -> Result<Vec<u64>> {
        self.view().locate(pattern, limit)
    }

    /// The text slice `T[pos..min(pos + len, n))`, empty for `pos >= n`.
    pub fn extract(&self, pos: usize, len: usize) -> &[u8] {
        self.view().extract(pos, len)
    }

    /// Writes the index into a container file at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        container::writer::write_index(self, path.as_ref())
    }

    pub fn text_len(&self) -> usize {
        self.text.len()
    }

    pub fn suffix_array_sampling_rate(&self) -> usize {
        self.suffix_array_samples.sampling_rate()
    }

    pub fn config(&self) -> &FmIndexConfig {
        &self.config
    }

    pub fn wavelet(&self) -> &WaveletTree {
        &self.wavelet
    }

    pub fn veb_layout(&self) -> Option<&VebLayout> {
        self.veb.as_ref()
    }

    pub fn learned_occ_table(&self) -> Option<&LearnedOccTable> {
        self.learned.as_ref()
    }

    pub(crate) fn text(&self) -> &[u8] {
        &self.text
    }

    pub(crate) fn bwt(&self) -> &[u8] {
        &self.bwt
    }

    pub(crate) fn count_table(&self) -> &[u32] {
        &self.count_table
    }

    pub(crate) fn suffix_array_samples(&self) -> &SampledSuffixArray {
        &self.suffix_array_samples
    }

    fn view(&self) -> IndexView<'_> {
        let occ = match &self.learned {
            Some(learned) => OccBackend::Learned(learned),
            None => OccBackend::Sampled(self.wavelet.level_refs()),
        };

        IndexView {
            n: self.text.len(),
            count_table: &self.count_table,
            bwt: &self.bwt,
            text: &self.text,
            sampling_rate: self.suffix_array_samples.sampling_rate(),
            samples: self.suffix_array_samples.samples(),
            occ,
        }
    }
}

// The last byte is the sentinel: it must be unique, and it should be the
// smallest byte for the suffix order to equal the rotation order.
fn validate_text(text: &[u8]) -> Result<()> {
    let (&sentinel, rest) = text.split_last().ok_or(Error::EmptyText)?;

    if text.len() > u32::MAX as usize {
        return Err(Error::TextTooLarge(text.len()));
    }
    if rest.contains(&sentinel) {
        return Err(Error::MissingSentinel);
    }
    if rest.iter().any(|&byte| byte < sentinel) {
        log::warn!(
            "sentinel byte {sentinel:#04x} is not minimal; patterns containing it match rotations"
        );
    }

    Ok(())
}

/// Occurrence-count backend of a query view: either the eight sampled
/// wavelet levels or the learned table.
pub(crate) enum OccBackend<'a> {
    Sampled([BitVectorRef<'a>; NUM_LEVELS]),
    Learned(&'a LearnedOccTable),
}

/// Borrowed view over all index components; implements the query loop once
/// for both [`FmIndex`] and [`MappedIndex`].
pub(crate) struct IndexView<'a> {
    pub(crate) n: usize,
    pub(crate) count_table: &'a [u32],
    pub(crate) bwt: &'a [u8],
    pub(crate) text: &'a [u8],
    pub(crate) sampling_rate: usize,
    pub(crate) samples: &'a [u32],
    pub(crate) occ: OccBackend<'a>,
}

impl<'a> IndexView<'a> {
    fn occurrences(&self, symbol: u8, index: usize) -> usize {
        match &self.occ {
            OccBackend::Sampled(levels) => wavelet::rank_over(levels, self.n, symbol, index),
            OccBackend::Learned(learned) => learned.rank(symbol, index),
        }
    }

    fn lf_step(&self, symbol: u8, index: usize) -> usize {
        self.count_table[symbol as usize] as usize + self.occurrences(symbol, index)
    }

    // backward search: returns the half-open BWT interval of suffixes
    // prefixed by the pattern
    fn interval(&self, pattern: &[u8]) -> (usize, usize) {
        let (mut start, mut end) = (0, self.n);

        for &symbol in pattern.iter().rev() {
            start = self.lf_step(symbol, start);
            end = self.lf_step(symbol, end);

            if start >= end {
                return (0, 0);
            }
        }

        (start, end)
    }

    pub(crate) fn count(&self, pattern: &[u8]) -> usize {
        if pattern.is_empty() {
            return self.n;
        }
        if self.n == 0 {
            return 0;
        }

        let (start, end) = self.interval(pattern);
        end - start
    }

    pub(crate) fn locate(&self, pattern: &[u8], limit: usize) -> Result<Vec<u64>> {
        if pattern.is_empty() || self.n == 0 {
            return Ok(Vec::new());
        }

        let (start, end) = self.interval(pattern);
        let mut positions = Vec::with_capacity((end - start).min(limit));

        for i in start..end {
            if positions.len() >= limit {
                break;
            }

            let mut bwt_index = i;
            let mut steps = 0u64;

            while bwt_index % self.sampling_rate != 0 {
                let symbol = self.bwt[bwt_index];
                bwt_index = self.lf_step(symbol, bwt_index);
                steps += 1;

                if steps > self.n as u64 {
                    return Err(Error::Corruption(format!(
                        "LF walk from BWT index {i} exceeded the text length"
                    )));
                }
            }

            let sample = self
                .samples
                .get(bwt_index / self.sampling_rate)
                .copied()
                .ok_or_else(|| {
                    Error::Corruption(format!(
                        "suffix array sample index {} out of range",
                        bwt_index / self.sampling_rate
                    ))
                })?;

            positions.push((sample as u64 + steps) % self.n as u64);
        }

        Ok(positions)
    }

    pub(crate) fn extract(&self, pos: usize, len: usize) -> &'a [u8] {
        if pos >= self.text.len() {
            return &[];
        }
        &self.text[pos..(pos + len).min(self.text.len())]
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_rejected() {
        assert!(matches!(
            FmIndexConfig::new().build(Vec::new()),
            Err(Error::EmptyText)
        ));
    }

    #[test]
    fn repeated_final_byte_is_rejected() {
        assert!(matches!(
            FmIndexConfig::new().build(b"abcabc".as_slice()),
            Err(Error::MissingSentinel)
        ));
    }

    #[test]
    fn zero_sampling_rate_is_rejected() {
        assert!(matches!(
            FmIndexConfig::new()
                .suffix_array_sampling_rate(0)
                .build(b"abc$".as_slice()),
            Err(Error::InvalidSamplingRate)
        ));
    }

    #[test]
    fn empty_pattern_follows_convention() {
        let index = FmIndexConfig::new().build(b"banana$".as_slice()).unwrap();
        assert_eq!(index.count(b""), 7);
        assert!(index.locate(b"", usize::MAX).unwrap().is_empty());
    }

    #[test]
    fn extract_clamps() {
        let index = FmIndexConfig::new().build(b"aabaabaa$".as_slice()).unwrap();
        assert_eq!(index.extract(0, 4), b"aaba");
        assert_eq!(index.extract(7, 100), b"a$");
        assert_eq!(index.extract(9, 5), b"");
        assert_eq!(index.extract(100, 5), b"");
    }
}
