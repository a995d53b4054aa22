//! Suffix array, BWT and cumulative count construction.
//!
//! The suffix array is built by libsais (linear time), fed with a
//! precomputed byte frequency table. Texts that fit i32 indices use the
//! 32-bit output element, larger texts fall back to i64.

use libsais::OutputElement;
use num_traits::NumCast;
use rayon::prelude::*;

use crate::sampled_suffix_array::SampledSuffixArray;

const FREQUENCY_CHUNK: usize = 1 << 16;

/// Byte frequencies of the text, counted in parallel chunks.
pub(crate) fn byte_frequencies(text: &[u8]) -> [u64; 256] {
    text.par_chunks(FREQUENCY_CHUNK)
        .map(|chunk| {
            let mut frequencies = [0u64; 256];
            for &byte in chunk {
                frequencies[byte as usize] += 1;
            }
            frequencies
        })
        .reduce(
            || [0u64; 256],
            |mut accumulator, frequencies| {
                for (sum, count) in accumulator.iter_mut().zip(frequencies) {
                    *sum += count;
                }
                accumulator
            },
        )
}

/// Rolls byte frequencies into the 257-entry cumulative count table:
/// `C[c]` is the number of text bytes strictly smaller than `c`, and
/// `C[256]` is the text length.
pub(crate) fn cumulative_counts(frequencies: &[u64; 256]) -> Vec<u32> {
    let mut count = Vec::with_capacity(257);
    let mut sum = 0u64;

    for &frequency in frequencies {
        count.push(sum as u32);
        sum += frequency;
    }
    count.push(sum as u32);

    count
}

/// Builds the BWT and the sampled suffix array in one pass over the
/// (transient) full suffix array.
pub(crate) fn bwt_and_samples<O: OutputElement + 'static>(
    text: &[u8],
    frequencies: &[u64; 256],
    sampling_rate: usize,
) -> (Vec<u8>, SampledSuffixArray) {
    let suffix_array = build_suffix_array::<O>(text, frequencies);
    let bwt = bwt_from_suffix_array(&suffix_array, text);
    let samples = SampledSuffixArray::from_suffix_array(&suffix_array, sampling_rate);
    (bwt, samples)
}

fn build_suffix_array<O: OutputElement + 'static>(
    text: &[u8],
    frequencies: &[u64; 256],
) -> Vec<O> {
    let mut frequency_table: Vec<O> = frequencies
        .iter()
        .map(|&value| <O as NumCast>::from(value).unwrap())
        .collect();

    let mut construction = libsais::SuffixArrayConstruction::for_text(text)
        .in_owned_buffer()
        .single_threaded();

    unsafe {
        construction = construction.with_frequency_table(&mut frequency_table);
    }

    construction
        .run()
        .expect("libsais suffix array construction")
        .into_vec()
}

// BWT[i] = T[SA[i] - 1], wrapping around to the last byte for SA[i] = 0.
fn bwt_from_suffix_array<O: OutputElement>(suffix_array: &[O], text: &[u8]) -> Vec<u8> {
    let mut bwt = vec![0; text.len()];

    for (suffix_array_index, &text_index) in suffix_array.iter().enumerate() {
        let text_index = <usize as NumCast>::from(text_index).unwrap();
        bwt[suffix_array_index] = if text_index > 0 {
            text[text_index - 1]
        } else {
            *text.last().unwrap()
        };
    }

    bwt
}
