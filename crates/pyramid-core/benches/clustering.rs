//! Clustering throughput benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::time::Duration;

use pyramid_core::aggregate::AggregateFunction;
use pyramid_core::config::{MeasureSpec, SortOrder, ZField};
use pyramid_core::{
    BoundaryMerger, ClusteringConfig, PartitionSpec, PartitionTree, PyramidBuilder, PyramidConfig, RawRecord,
    ShardClusterer, SplitAxis,
};

const SIZES: &[usize] = &[1_000, 10_000, 100_000];

fn config() -> ClusteringConfig {
    let mut config = ClusteringConfig::new(1.0, 2.0, 16.0, 16.0);
    config.top_k = 4;
    config.z = Some(ZField::new("rank", SortOrder::Desc));
    config.measures = vec![MeasureSpec {
        field: "v".to_string(),
        function: AggregateFunction::Avg,
        extent: None,
    }];
    config
}

/// Points around a handful of gaussian hot spots in a 10k × 10k domain
fn generate_records(n: usize, seed: u64) -> Vec<RawRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let spread = Normal::new(0.0, 400.0).unwrap();
    let centers: Vec<(f64, f64)> = (0..8)
        .map(|_| (rng.gen_range(1_000.0..9_000.0), rng.gen_range(1_000.0..9_000.0)))
        .collect();

    (0..n)
        .map(|i| {
            let (cx, cy) = centers[i % centers.len()];
            let x = (cx + spread.sample(&mut rng)).clamp(0.0, 10_000.0);
            let y = (cy + spread.sample(&mut rng)).clamp(0.0, 10_000.0);
            RawRecord::new(x, y)
                .with_field("v", rng.gen_range(0..1_000))
                .with_field("rank", rng.gen_range(0..100))
        })
        .collect()
}

fn bench_shard_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("shard_clustering");
    group.measurement_time(Duration::from_secs(5));
    let config = config();

    for &n in SIZES {
        let records = generate_records(n, 42);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("records", n), &records, |b, records| {
            let engine = ShardClusterer::new(&config, 0).unwrap();
            b.iter(|| engine.cluster_records(black_box(records)).unwrap())
        });
    }
    group.finish();
}

fn bench_boundary_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("boundary_merge");
    let config = config();
    let engine = ShardClusterer::new(&config, 0).unwrap();
    let merger = BoundaryMerger::new(&config).unwrap();

    for &n in SIZES {
        let clusters = engine.cluster_records(&generate_records(n, 7)).unwrap();
        group.bench_with_input(BenchmarkId::new("clusters", clusters.len()), &clusters, |b, clusters| {
            b.iter(|| merger.reconcile(black_box(clusters.clone()), SplitAxis::X).unwrap())
        });
    }
    group.finish();
}

fn bench_pyramid(c: &mut Criterion) {
    let mut group = c.benchmark_group("pyramid");
    group.sample_size(10);

    let mut clustering = config();
    clustering.num_levels = 8;
    let pyramid_config = PyramidConfig::new(clustering);
    let tree = PartitionTree::from_spec(&PartitionSpec::uniform([0.0, 0.0, 10_000.0, 10_000.0], 4, 0).unwrap()).unwrap();
    let builder = PyramidBuilder::new(&pyramid_config, tree).unwrap();

    let records = generate_records(100_000, 3);
    group.throughput(Throughput::Elements(records.len() as u64));
    group.bench_function("build_100k_16_shards", |b| {
        b.iter(|| builder.build(black_box(records.clone())).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_shard_clustering, bench_boundary_merge, bench_pyramid);
criterion_main!(benches);
