use std::hint::black_box;
use std::sync::Arc;

use cluster::{Centroid, ClusterConfig, ClusteringEngine, InMemoryClusterStore, TopicId, decide};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use embed::StubEmbedder;

const DIM: usize = 384;

/// Deterministic pseudo-random vector per seed.
fn vector(seed: u64) -> Vec<f32> {
    let mut state = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    (0..DIM)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) as f32 / (1u64 << 31) as f32) - 0.5
        })
        .collect()
}

fn centroids(count: usize) -> Vec<Centroid> {
    (0..count)
        .map(|i| Centroid::new(TopicId::new(i as u32 + 1), vector(i as u64)))
        .collect()
}

/// Benchmark the pure decision against snapshots up to the default topic cap.
fn bench_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("decide");
    let cfg = ClusterConfig::default();
    let embedding = vector(10_000);

    for count in [1usize, 5, 20] {
        let snapshot = centroids(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(count),
            &snapshot,
            |b, snapshot| {
                b.iter(|| decide(black_box(&embedding), black_box(snapshot), &cfg));
            },
        );
    }
    group.finish();
}

fn bench_stub_embed(c: &mut Criterion) {
    let embedder = StubEmbedder::new(DIM);
    let text = "Sparse attention for long documents: scaling transformers to book-length inputs \
                with linear memory and competitive perplexity on standard benchmarks";

    c.bench_function("stub_embed", |b| {
        b.iter(|| embedder.embed_text(black_box(text)));
    });
}

/// Full assign round-trip against the in-memory store, one writer.
fn bench_assign(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("tokio runtime");
    let engine = ClusteringEngine::new(
        Arc::new(InMemoryClusterStore::new()),
        ClusterConfig::default(),
    )
    .expect("engine");

    let mut seed = 0u64;
    c.bench_function("assign_in_memory", |b| {
        b.iter(|| {
            seed += 1;
            let embedding = vector(seed % 64);
            runtime.block_on(engine.assign(black_box(&embedding)))
        });
    });
}

criterion_group!(benches, bench_decide, bench_stub_embed, bench_assign);
criterion_main!(benches);
