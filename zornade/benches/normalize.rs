//! Benchmarks pour la normalisation des géométries

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zornade::{normalize, RawGeometry, RawRing};

/// Ring circulaire non fermé de `points` sommets
fn circle(cx: f64, cy: f64, radius: f64, points: usize) -> RawRing {
    (0..points)
        .map(|i| {
            let angle = i as f64 / points as f64 * std::f64::consts::TAU;
            [cx + radius * angle.cos(), cy + radius * angle.sin()]
        })
        .collect()
}

fn bench_polygon(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_polygon");

    for points in [8usize, 64, 512] {
        let raw = RawGeometry::Polygon(vec![
            circle(11.0, 45.0, 0.001, points),
            circle(11.0, 45.0, 0.0002, points / 2),
        ]);
        group.throughput(Throughput::Elements(points as u64));
        group.bench_with_input(BenchmarkId::from_parameter(points), &raw, |b, raw| {
            b.iter(|| normalize(black_box(raw)))
        });
    }

    group.finish();
}

fn bench_multipolygon(c: &mut Criterion) {
    let raw = RawGeometry::MultiPolygon(
        (0..20)
            .map(|i| vec![circle(11.0 + i as f64 * 0.01, 45.0, 0.001, 32)])
            .collect(),
    );

    c.bench_function("normalize_multipolygon_20x32", |b| {
        b.iter(|| normalize(black_box(&raw)))
    });
}

criterion_group!(benches, bench_polygon, bench_multipolygon);
criterion_main!(benches);
