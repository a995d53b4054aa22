use csidx::{FmIndex, FmIndexConfig};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;

fn all_configs() -> Vec<FmIndexConfig> {
    vec![
        FmIndexConfig::new(),
        FmIndexConfig::new().learned_occ(true),
        FmIndexConfig::new().veb_layout(true),
        FmIndexConfig::new().learned_occ(true).veb_layout(true),
        FmIndexConfig::new().suffix_array_sampling_rate(1),
        FmIndexConfig::new().suffix_array_sampling_rate(5),
    ]
}

fn naive_positions(text: &[u8], pattern: &[u8]) -> HashSet<u64> {
    if pattern.is_empty() {
        return HashSet::new();
    }
    text.windows(pattern.len())
        .enumerate()
        .filter(|(_, window)| *window == pattern)
        .map(|(position, _)| position as u64)
        .collect()
}

fn located(index: &FmIndex, pattern: &[u8]) -> HashSet<u64> {
    index.locate(pattern, usize::MAX).unwrap().into_iter().collect()
}

#[test]
fn banana() {
    for config in all_configs() {
        let index = config.build(b"banana$".as_slice()).unwrap();

        assert_eq!(index.count(b"ana"), 2);
        assert_eq!(located(&index, b"ana"), HashSet::from_iter([1, 3]));
        assert_eq!(located(&index, b"banana"), HashSet::from_iter([0]));
        assert_eq!(index.count(b"x"), 0);
        assert!(located(&index, b"x").is_empty());
    }
}

#[test]
fn alternating_text() {
    for config in all_configs() {
        let index = config.build(b"abababab$".as_slice()).unwrap();

        assert_eq!(index.count(b"ab"), 4);
        assert_eq!(index.count(b"aba"), 3);
        assert_eq!(located(&index, b"aba"), HashSet::from_iter([0, 2, 4]));
    }
}

#[test]
fn overlapping_runs() {
    for config in all_configs() {
        let index = config.build(b"aabaabaa$".as_slice()).unwrap();

        assert_eq!(index.count(b"aa"), 3);
        assert_eq!(index.count(b"aab"), 2);
        assert_eq!(index.extract(0, 4), b"aaba");
    }
}

#[test]
fn full_byte_alphabet() {
    // two copies of every byte value 1..=255, terminated by the minimal
    // sentinel 0
    let mut text: Vec<u8> = (1..=255u8).collect();
    text.extend(1..=255u8);
    text.push(0);

    for config in [FmIndexConfig::new(), FmIndexConfig::new().learned_occ(true)] {
        let index = config.build(text.clone()).unwrap();

        for c in 1..=255u8 {
            assert_eq!(index.count(&[c]), 2, "byte {c}");
            assert_eq!(
                located(&index, &[c]),
                HashSet::from_iter([c as u64 - 1, 255 + c as u64 - 1]),
                "byte {c}"
            );
        }
    }
}

#[test]
fn locate_respects_limit() {
    let index = FmIndexConfig::new().build(b"abababab$".as_slice()).unwrap();

    assert_eq!(index.locate(b"ab", 2).unwrap().len(), 2);
    assert_eq!(index.locate(b"ab", 0).unwrap().len(), 0);
    assert_eq!(index.locate(b"ab", usize::MAX).unwrap().len(), 4);
}

#[test]
fn pattern_longer_than_text() {
    let index = FmIndexConfig::new().build(b"abc$".as_slice()).unwrap();
    assert_eq!(index.count(b"abcabcabc"), 0);
    assert!(located(&index, b"abcabcabc").is_empty());
}

#[test]
fn single_symbol_text() {
    let index = FmIndexConfig::new().build(b"$".as_slice()).unwrap();
    assert_eq!(index.count(b""), 1);
    assert_eq!(index.count(b"$"), 1);
    assert_eq!(index.count(b"a"), 0);
}

struct SampledQueries<'t, 'r> {
    text: &'t [u8],
    rng: &'r mut ChaCha8Rng,
    max_extent: usize,
}

impl<'t, 'r> Iterator for SampledQueries<'t, 'r> {
    type Item = &'t [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.text.len() < 2 {
            return None;
        }
        let position = self.rng.random_range(0..self.text.len() - 1);
        let extent_bound = self.max_extent.min(self.text.len() - position);
        let extent = self.rng.random_range(1..=extent_bound);
        Some(&self.text[position..position + extent])
    }
}

proptest! {
    #[test]
    fn correctness_random_texts(
        body in prop::collection::vec((0usize..5).prop_map(|i| b"abcde"[i]), 0..1500),
        suffix_array_sampling_rate in 1usize..=64,
        seed in any::<u64>()
    ) {
        let mut text = body;
        text.push(b'$');

        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let existing_queries: Vec<_> = SampledQueries {
            text: &text,
            rng: &mut rng,
            max_extent: 30,
        }
        .take(15)
        .collect();

        let random_queries: Vec<Vec<u8>> = (0..30)
            .map(|_| {
                let len = rng.random_range(1..12);
                (0..len).map(|_| b"abcde"[rng.random_range(0..5)]).collect()
            })
            .collect();

        let index = FmIndexConfig::new()
            .suffix_array_sampling_rate(suffix_array_sampling_rate)
            .build(text.clone())
            .unwrap();
        let learned_index = FmIndexConfig::new()
            .suffix_array_sampling_rate(suffix_array_sampling_rate)
            .learned_occ(true)
            .build(text.clone())
            .unwrap();

        for query in existing_queries.iter().copied().chain(random_queries.iter().map(|q| q.as_slice())) {
            let expected = naive_positions(&text, query);

            prop_assert_eq!(index.count(query), expected.len());
            prop_assert_eq!(learned_index.count(query), expected.len());

            let positions = located(&index, query);
            let learned_positions = located(&learned_index, query);
            prop_assert_eq!(&positions, &expected);
            prop_assert_eq!(&learned_positions, &expected);
        }
    }
}
