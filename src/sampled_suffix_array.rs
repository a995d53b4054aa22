//! Sampled suffix array: SA values retained at regular BWT positions.

use libsais::OutputElement;
use num_traits::NumCast;

/// Suffix array samples at every BWT index that is a multiple of the
/// sampling rate. Trades `n / rate` words of space against up to `rate`
/// LF steps per located occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledSuffixArray {
    sampling_rate: usize,
    samples: Vec<u32>,
}

impl SampledSuffixArray {
    pub(crate) fn from_suffix_array<O: OutputElement>(
        suffix_array: &[O],
        sampling_rate: usize,
    ) -> Self {
        let samples = suffix_array
            .iter()
            .step_by(sampling_rate)
            .map(|&value| <u32 as NumCast>::from(value).unwrap())
            .collect();

        Self {
            sampling_rate,
            samples,
        }
    }

    pub(crate) fn from_parts(sampling_rate: usize, samples: Vec<u32>) -> Self {
        Self {
            sampling_rate,
            samples,
        }
    }

    pub fn sampling_rate(&self) -> usize {
        self.sampling_rate
    }

    pub fn samples(&self) -> &[u32] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_every_stride() {
        let suffix_array: Vec<i32> = vec![6, 5, 3, 1, 0, 4, 2];
        let sampled = SampledSuffixArray::from_suffix_array(&suffix_array, 3);

        assert_eq!(sampled.sampling_rate(), 3);
        assert_eq!(sampled.samples(), &[6, 1, 2]);
    }

    #[test]
    fn rate_one_keeps_everything() {
        let suffix_array: Vec<i32> = vec![3, 0, 1, 2];
        let sampled = SampledSuffixArray::from_suffix_array(&suffix_array, 1);
        assert_eq!(sampled.samples(), &[3, 0, 1, 2]);
    }

    #[test]
    fn rate_beyond_length() {
        let suffix_array: Vec<i32> = vec![1, 0];
        let sampled = SampledSuffixArray::from_suffix_array(&suffix_array, 16);
        assert_eq!(sampled.samples(), &[1]);
    }
}
