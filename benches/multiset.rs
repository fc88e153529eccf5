//! Benchmarks for the multiset differ and masking view fan-out

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use powermax_reconciler::controlplane::listing::{list_masking_views, ListingConfig};
use powermax_reconciler::domain::records::{MaskingViewConnection, MaskingViewRecord};
use powermax_reconciler::reconcile::multiset;
use powermax_reconciler::{PowerMaxClientRef, SimulatedArray};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const ARRAY: &str = "000197900123";

fn volume_ids(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("{:05X}", i)).collect()
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("multiset_partition");

    for size in [10usize, 100, 1_000, 10_000] {
        // half the members overlap
        let desired = volume_ids(0..size);
        let observed = volume_ids(size / 2..size + size / 2);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| multiset::partition(black_box(&desired), black_box(&observed)));
        });
    }

    group.finish();
}

fn bench_equal(c: &mut Criterion) {
    let mut group = c.benchmark_group("multiset_equal");

    let desired = volume_ids(0..1_000);
    let mut shuffled = desired.clone();
    shuffled.reverse();

    group.throughput(Throughput::Elements(1_000));
    group.bench_function("reordered_1000", |b| {
        b.iter(|| multiset::equal(black_box(&desired), black_box(&shuffled)));
    });

    group.finish();
}

fn bench_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking_view_listing");
    group.throughput(Throughput::Elements(200));

    let array = SimulatedArray::new(ARRAY);
    for i in 0..200 {
        array.insert_masking_view(
            MaskingViewRecord {
                masking_view_id: format!("mv-{:03}", i),
                host_group_id: Some("cluster-a".to_string()),
                port_group_id: "pg-fc".to_string(),
                storage_group_id: format!("sg-{:03}", i),
                ..Default::default()
            },
            vec![MaskingViewConnection {
                volume_id: format!("{:05X}", i),
                cap_gb: 100.0,
                logged_in: true,
                ..Default::default()
            }],
        );
    }
    let client: PowerMaxClientRef = Arc::new(array);
    let config = ListingConfig::default();

    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("list_200_views", |b| {
        b.iter(|| {
            rt.block_on(async {
                let listed = list_masking_views(&client, ARRAY, &config, &CancellationToken::new())
                    .await
                    .unwrap();
                black_box(listed.views.len())
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_partition, bench_equal, bench_listing);
criterion_main!(benches);
