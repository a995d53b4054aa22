//! Build-time configuration of the index.

use crate::container::{FLAG_LEARNED_OCC, FLAG_VEB_LAYOUT};
use crate::error::Result;
use crate::learned::LearnedConfig;
use crate::FmIndex;

/// Configuration consumed by [`FmIndex::build_from_text`].
///
/// The container header flags mirror the feature switches, so an index
/// reopened from disk behaves like the one that was saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FmIndexConfig {
    pub(crate) suffix_array_sampling_rate: usize,
    pub(crate) learned_occ: bool,
    pub(crate) veb_layout: bool,
    pub(crate) learned: LearnedConfig,
}

impl FmIndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sampling rate of the suffix array (default 32). Smaller rates make
    /// `locate` faster and the index larger.
    pub fn suffix_array_sampling_rate(self, suffix_array_sampling_rate: usize) -> Self {
        Self {
            suffix_array_sampling_rate,
            ..self
        }
    }

    /// Answer occurrence queries through the learned rank backend instead
    /// of the sampled one.
    pub fn learned_occ(self, enabled: bool) -> Self {
        Self {
            learned_occ: enabled,
            ..self
        }
    }

    /// Additionally pack the wavelet levels into page-aligned macroblocks.
    pub fn veb_layout(self, enabled: bool) -> Self {
        Self {
            veb_layout: enabled,
            ..self
        }
    }

    /// Strides of the learned rank backend (defaults: 512/32, two-word
    /// popcount tail).
    pub fn learned_config(self, learned: LearnedConfig) -> Self {
        Self { learned, ..self }
    }

    pub fn build(self, text: impl Into<Vec<u8>>) -> Result<FmIndex> {
        FmIndex::build_from_text(text, self)
    }

    /// The container header flag bits this configuration maps to.
    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.learned_occ {
            flags |= FLAG_LEARNED_OCC;
        }
        if self.veb_layout {
            flags |= FLAG_VEB_LAYOUT;
        }
        flags
    }
}

impl Default for FmIndexConfig {
    fn default() -> Self {
        Self {
            suffix_array_sampling_rate: 32,
            learned_occ: false,
            veb_layout: false,
            learned: LearnedConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chaining() {
        let config = FmIndexConfig::new()
            .suffix_array_sampling_rate(8)
            .learned_occ(true)
            .veb_layout(true);

        assert_eq!(config.suffix_array_sampling_rate, 8);
        assert_eq!(config.flags(), FLAG_LEARNED_OCC | FLAG_VEB_LAYOUT);

        let index = config.build(b"mississippi$".as_slice()).unwrap();
        assert_eq!(index.count(b"ss"), 2);
    }
}
