//! Criterion benchmarks for the post-harvest reduction.
//!
//! Benchmarks:
//! 1. Weekly aggregation over 1, 5 and 9 years of daily samples
//! 2. Rolling smoother over the resulting buckets
//! 3. Aggregate + smooth end to end for a full reference run

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use weekcap_core::data::synthetic_listings;
use weekcap_core::domain::{DailySample, DEFAULT_TOP_K};
use weekcap_core::{aggregate, smooth, SmoothingWeights};

// ── Helpers ──────────────────────────────────────────────────────────

fn run_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 1, 1).unwrap()
}

fn make_samples(days: i64) -> Vec<DailySample> {
    (0..days)
        .map(|i| {
            let day = run_start() + Duration::days(i);
            let entities = synthetic_listings(day, 100)
                .iter()
                .filter_map(|l| l.to_record().ok())
                .collect();
            DailySample::observed(day, entities)
        })
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("weekly_aggregate");

    for &days in &[365_i64, 1826, 3428] {
        let samples = make_samples(days);
        group.bench_with_input(BenchmarkId::new("days", days), &days, |b, _| {
            b.iter(|| aggregate(black_box(&samples), run_start(), DEFAULT_TOP_K));
        });
    }

    group.finish();
}

fn bench_smooth(c: &mut Criterion) {
    let mut group = c.benchmark_group("rolling_smooth");
    let weights = SmoothingWeights::default();

    for &days in &[365_i64, 3428] {
        let buckets = aggregate(&make_samples(days), run_start(), DEFAULT_TOP_K).unwrap();
        group.bench_with_input(BenchmarkId::new("weeks", buckets.len()), &buckets, |b, buckets| {
            b.iter(|| smooth(black_box(buckets), &weights, DEFAULT_TOP_K));
        });
    }

    group.finish();
}

fn bench_full_reduction(c: &mut Criterion) {
    let samples = make_samples(3428);
    let weights = SmoothingWeights::default();

    c.bench_function("aggregate_then_smooth_reference_run", |b| {
        b.iter(|| {
            let buckets = aggregate(black_box(&samples), run_start(), DEFAULT_TOP_K).unwrap();
            smooth(&buckets, &weights, DEFAULT_TOP_K).unwrap()
        });
    });
}

criterion_group!(benches, bench_aggregate, bench_smooth, bench_full_reduction);
criterion_main!(benches);
