//! Benchmarks for the lsh-knn library.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lsh_knn::prelude::*;
use rand::prelude::*;
use std::sync::Arc;

fn generate_lines(n: usize, dim: usize, seed: u64) -> Vec<String> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let values: Vec<String> = (0..dim).map(|_| format!("{:.4}", rng.gen_range(-1.0..1.0))).collect();
            format!("rec{i}\t{}", values.join(","))
        })
        .collect()
}

fn generate_vector(dim: usize, seed: u64) -> Vector {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    Vector::dense((0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
}

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for &dim in &[16, 128, 1024] {
        let query = generate_vector(dim, 1);
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        for variant in [HashVariant::Euclidean, HashVariant::Angular] {
            let family = HashFamilyGenerator::new(dim, 32, variant).generate(&mut rng).unwrap();
            let width = variant.uses_buckets().then_some(4.0);
            let encoder = SignatureEncoder::new(&family, width).unwrap();
            group.bench_with_input(BenchmarkId::new(variant.to_string(), dim), &dim, |b, _| {
                b.iter(|| black_box(encoder.encode(&query).unwrap()))
            });
        }
    }

    group.finish();
}

fn benchmark_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");

    for &n in &[1_000, 10_000, 50_000] {
        let lines = generate_lines(n, 32, 42);
        let config = LshConfig::angular(32).with_signature_length(24).with_seed(7);
        let pipeline = LshPipeline::builder(config)
            .query(generate_vector(32, 3))
            .build()
            .unwrap();
        let filter = CandidateFilter::new(
            Arc::clone(pipeline.artifact()),
            FilterPolicy::HammingThreshold { threshold: 0.5 },
            FilterOptions::default(),
        )
        .unwrap();

        group.bench_with_input(BenchmarkId::new("angular_threshold", n), &n, |b, _| {
            b.iter(|| black_box(filter.run(&lines).unwrap()))
        });
    }

    group.finish();
}

fn benchmark_rerank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rerank");

    for &n in &[1_000, 10_000, 100_000] {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let candidates: Vec<CandidateRecord> = (0..n)
            .map(|i| {
                let bits: Vec<bool> = (0..64).map(|_| rng.gen()).collect();
                CandidateRecord::new(i, Signature::Bits(BitSketch::from_bools(&bits)), format!("rec{i}"))
            })
            .collect();
        let query = Signature::Bits(BitSketch::from_bools(&[true; 64]));
        let reranker = ExactReranker::new();

        group.bench_with_input(BenchmarkId::new("top_k20", n), &n, |b, _| {
            b.iter(|| black_box(reranker.rerank(&candidates, &query, 20).unwrap()))
        });
    }

    group.finish();
}

fn benchmark_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);

    let lines = generate_lines(20_000, 16, 9);
    for mode in [SearchMode::DirectFilter, SearchMode::SignatureKeyed] {
        let config = LshConfig::angular(16)
            .with_signature_length(16)
            .with_threshold(0.3)
            .with_num_neighbors(10)
            .with_seed(11)
            .with_shortfall_policy(ShortfallPolicy::ReturnAvailable);
        let pipeline = LshPipeline::builder(config)
            .query(generate_vector(16, 5))
            .mode(mode)
            .build()
            .unwrap();

        group.bench_function(format!("{mode:?}"), |b| b.iter(|| black_box(pipeline.run(&lines).unwrap())));
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_encode,
    benchmark_filter,
    benchmark_rerank,
    benchmark_pipeline,
);

criterion_main!(benches);
