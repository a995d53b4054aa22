use criterion::{black_box, criterion_group, criterion_main, Criterion};
use csidx::bitvec::{BitVector, RankSupport};
use csidx::wavelet::WaveletTree;
use csidx::FmIndexConfig;

fn build_text() -> Vec<u8> {
    let mut text = Vec::new();
    for _ in 0..400 {
        text.extend_from_slice(b"the quick brown fox jumps over the lazy dog. ");
    }
    text.push(b'$');
    text
}

fn bench_bitvector(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitvector");
    let words = vec![0xAAAA_AAAA_AAAA_AAAAu64; 1000]; // 64000 bits, 50% density
    let bv = BitVector::from_words(words, 64000);

    group.bench_function("rank1", |b| {
        b.iter(|| {
            for i in (0..64000).step_by(7) {
                black_box(bv.rank1(i));
            }
        })
    });
    group.finish();
}

fn bench_wavelet(c: &mut Criterion) {
    let mut group = c.benchmark_group("wavelet");
    let text = build_text();
    let wt = WaveletTree::build(&text);

    group.bench_function("rank", |b| {
        b.iter(|| {
            for i in (0..text.len()).step_by(13) {
                black_box(wt.rank(b'o', i));
            }
        })
    });
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("fmindex");
    let text = build_text();
    let index = FmIndexConfig::new().build(text.clone()).unwrap();
    let learned = FmIndexConfig::new()
        .learned_occ(true)
        .build(text)
        .unwrap();

    group.bench_function("count", |b| {
        b.iter(|| black_box(index.count(b"quick brown")))
    });
    group.bench_function("count_learned", |b| {
        b.iter(|| black_box(learned.count(b"quick brown")))
    });
    group.bench_function("locate", |b| {
        b.iter(|| black_box(index.locate(b"lazy", 1000).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_bitvector, bench_wavelet, bench_queries);
criterion_main!(benches);
