//! Sketch operation benchmarks
//!
//! Baseline cost of the primitives every trial times: hashing, adding,
//! merging and estimating, per precision.
//!
//! Run with: cargo bench --bench sketch_operations

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hll_bench::sketch::{HashFunction, Precision, Sketch, SketchRollup};

const SMALL_SIZE: i64 = 1_000; // 1K values
const MEDIUM_SIZE: i64 = 100_000; // 100K values

/// Benchmark building a sketch from raw values
fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("sketch_add");

    for precision in Precision::ALL {
        group.bench_with_input(
            BenchmarkId::new(format!("p{precision}"), MEDIUM_SIZE),
            &MEDIUM_SIZE,
            |b, &n| {
                b.iter(|| Sketch::from_values(precision, black_box(0..n)));
            },
        );
    }

    group.finish();
}

/// Benchmark hash functions over the same values
fn bench_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash");
    let values: Vec<i64> = (0..MEDIUM_SIZE).collect();

    for function in HashFunction::ALL {
        group.bench_with_input(BenchmarkId::new(function.name(), MEDIUM_SIZE), &values, |b, data| {
            b.iter(|| {
                black_box(data)
                    .iter()
                    .fold(0u64, |acc, v| acc ^ function.hash(*v).value())
            });
        });
    }

    group.finish();
}

/// Benchmark merging and estimating
fn bench_merge_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("sketch_merge_estimate");

    for precision in Precision::ALL {
        let left = Sketch::from_values(precision, 0..MEDIUM_SIZE);
        let right = Sketch::from_values(precision, MEDIUM_SIZE / 2..MEDIUM_SIZE * 3 / 2);

        group.bench_function(BenchmarkId::new("merge", format!("p{precision}")), |b| {
            b.iter(|| {
                let mut merged = left.clone();
                merged.merge(black_box(&right)).unwrap();
                merged
            });
        });
        group.bench_function(BenchmarkId::new("estimate", format!("p{precision}")), |b| {
            b.iter(|| black_box(&left).estimate());
        });
    }

    group.finish();
}

/// Benchmark a 30-day window union over daily roll-ups
fn bench_rollup_union(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollup_union");
    let mut rollup = SketchRollup::new(Precision::P14);
    for day in 1..=90 {
        for user in 0..SMALL_SIZE {
            rollup.add(day, (day * 37 + user * 11) % 250_000);
        }
    }

    for window in [7usize, 30, 90] {
        group.bench_with_input(BenchmarkId::new("union_last", window), &window, |b, &days| {
            b.iter(|| rollup.union_last(days).unwrap().0.estimate());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_add, bench_hash, bench_merge_estimate, bench_rollup_union);
criterion_main!(benches);
