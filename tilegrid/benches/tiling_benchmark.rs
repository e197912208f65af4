//! Benchmarks for tile generation and label reprojection

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use std::hint::black_box;
use tilegrid::{build_dataset, generate_tiles, reproject_box, GroundTruthBox, TilingConfig};

fn create_test_boxes(n_boxes: usize, width: u32, height: u32) -> Vec<GroundTruthBox> {
    let mut rng = rand::thread_rng();
    (0..n_boxes)
        .map(|_| {
            GroundTruthBox::new(
                rng.gen_range(0..2),
                rng.gen_range(0.0..width as f64),
                rng.gen_range(0.0..height as f64),
                rng.gen_range(15.0..120.0),
                rng.gen_range(15.0..120.0),
            )
        })
        .collect()
}

fn bench_generate_tiles(c: &mut Criterion) {
    let config = TilingConfig::default();

    c.bench_function("generate_tiles_10000x10000", |b| {
        b.iter(|| {
            let count = generate_tiles(black_box((10_000, 10_000)), &config)
                .unwrap()
                .count();
            black_box(count)
        })
    });
}

fn bench_reproject_single(c: &mut Criterion) {
    let config = TilingConfig::default();
    let tiles: Vec<_> = generate_tiles((6000, 6000), &config).unwrap().collect();
    let gt = GroundTruthBox::new(0, 2750.0, 2750.0, 60.0, 45.0);

    c.bench_function("reproject_box_all_tiles", |b| {
        b.iter(|| {
            tiles
                .iter()
                .filter_map(|t| reproject_box(black_box(&gt), t, config.min_visibility))
                .count()
        })
    });
}

fn bench_build_dataset_various_sizes(c: &mut Criterion) {
    let config = TilingConfig::default();
    let mut group = c.benchmark_group("build_dataset");

    for n_boxes in [10, 100, 1000, 5000] {
        let boxes = create_test_boxes(n_boxes, 12_000, 12_000);
        group.bench_with_input(BenchmarkId::from_parameter(n_boxes), &boxes, |b, boxes| {
            b.iter(|| build_dataset(black_box((12_000, 12_000)), boxes, &config).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_generate_tiles,
    bench_reproject_single,
    bench_build_dataset_various_sizes
);
criterion_main!(benches);
