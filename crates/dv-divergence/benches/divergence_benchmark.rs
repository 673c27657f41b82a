use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;

use dv_divergence::{Divergence, JsDivergence, KlDivergence, KlMode};
use dv_estimators::{CovMode, GaussianEstimator, KernelDensityEstimator};
use dv_tensor::{DataTensor, IndexRange};

fn make_series(n: usize, d: usize) -> Arc<DataTensor> {
    // Deterministic pseudo-noise; keep it cheap.
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..d).map(|a| (((i * 7919 + a * 104729) % 101) as f64 / 101.0 - 0.5) * 2.0).collect())
        .collect();
    Arc::new(DataTensor::from_rows(&rows).unwrap())
}

fn bench_kl_gaussian(c: &mut Criterion) {
    let mut group = c.benchmark_group("kl_gaussian");

    for n in [200usize, 1000, 5000] {
        let data = make_series(n, 3);
        let mut kl = KlDivergence::with_data(
            Box::new(GaussianEstimator::new(CovMode::Full)),
            data.clone(),
            KlMode::Unbiased,
        )
        .unwrap();
        let range = IndexRange::temporal(&data, n / 4, n / 4 + n / 10);

        group.bench_with_input(BenchmarkId::new("score", n), &n, |b, _| {
            b.iter(|| black_box(kl.score(black_box(&range)).unwrap()));
        });
    }

    group.finish();
}

fn bench_js_kde(c: &mut Criterion) {
    let mut group = c.benchmark_group("js_kde");

    for n in [200usize, 500] {
        let data = make_series(n, 1);
        let mut js = JsDivergence::with_data(
            Box::new(KernelDensityEstimator::new(1.0).unwrap()),
            data.clone(),
        )
        .unwrap();
        let range = IndexRange::temporal(&data, n / 4, n / 4 + n / 10);

        group.bench_with_input(BenchmarkId::new("score", n), &n, |b, _| {
            b.iter(|| black_box(js.score(black_box(&range)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_kl_gaussian, bench_js_kde);
criterion_main!(benches);
