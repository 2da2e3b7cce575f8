//! Benchmarks for the segment store's write-to-flush and merge paths.
//!
//! Run with: cargo bench --bench segment_merge

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fts5_core::pending::PendingHash;
use fts5_core::segment::merge::merge_segments;
use fts5_core::segment::structure::StructureRecord;
use fts5_core::segment::Segment;

const TECHNICAL_TERMS: &[&str] = &[
    "rust", "programming", "inverted", "index", "tokenizer", "postings", "segment",
    "merge", "varint", "poslist", "rowid", "cursor", "phrase", "query", "rank",
];

fn drained_entries(doc_count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut hash = PendingHash::new();
    for rowid in 0..doc_count as i64 {
        for pos in 0..15u32 {
            let term = TECHNICAL_TERMS[(rowid as usize + pos as usize) % TECHNICAL_TERMS.len()];
            hash.write(term.as_bytes(), rowid, 0, pos).unwrap();
        }
    }
    hash.drain()
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_flush");

    for &doc_count in &[100usize, 1_000] {
        group.throughput(Throughput::Elements(doc_count as u64));
        group.bench_with_input(
            BenchmarkId::new("flush", doc_count),
            &doc_count,
            |b, &doc_count| {
                b.iter_batched(
                    || (StructureRecord::new(4), drained_entries(doc_count)),
                    |(mut structure, entries)| {
                        structure.flush(black_box(entries), 4096).unwrap();
                        black_box(structure)
                    },
                    criterion::BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

fn build_segment(doc_count: usize, segment_id: u64) -> Segment {
    let mut entries = drained_entries(doc_count);
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Segment::build(entries, segment_id, 0, 4096).unwrap()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_merge");

    for &segment_count in &[2usize, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("merge", segment_count),
            &segment_count,
            |b, &segment_count| {
                let segments: Vec<Segment> = (0..segment_count)
                    .map(|i| build_segment(200, i as u64 + 1))
                    .collect();
                b.iter(|| {
                    black_box(
                        merge_segments(black_box(&segments), 1000, 1, 4096, true).unwrap(),
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_cascade");

    // Flushing enough level-0 segments to force a cascading merge up through
    // the default K=4 fan-out, the case the tiered-merge policy exists for.
    group.bench_function("cascade_16_flushes", |b| {
        b.iter_batched(
            || StructureRecord::new(4),
            |mut structure| {
                for _ in 0..16 {
                    structure.flush(drained_entries(50), 4096).unwrap();
                }
                black_box(structure)
            },
            criterion::BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_flush, bench_merge, bench_cascade);
criterion_main!(benches);
