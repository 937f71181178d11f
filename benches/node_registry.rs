//! Benchmark for the node registry
//!
//! Covers the request-path operations and a full sweep over a
//! low-thousands fleet.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use fleet_manager::{ManualClock, NodeRegistration, NodeRegistry};
use std::sync::Arc;
use std::time::Duration;

const FLEET_SIZE: usize = 2000;

fn populated_registry() -> (Arc<NodeRegistry>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let registry = NodeRegistry::with_clock(clock.clone());
    for i in 0..FLEET_SIZE {
        registry.register(
            NodeRegistration::new(format!("node-{:04}", i), "microclaw")
                .with_capabilities(["mqtt", "dht22"]),
        );
    }
    (registry, clock)
}

fn bench_register_nodes(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_registry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("register_single_node", |b| {
        let registry = NodeRegistry::new();
        let mut counter = 0u64;

        b.iter(|| {
            counter += 1;
            registry.register(black_box(NodeRegistration::new(
                format!("node-{}", counter),
                "microclaw",
            )));
        });
    });

    group.finish();
}

fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_registry");
    group.throughput(Throughput::Elements(1));

    let (registry, _) = populated_registry();

    group.bench_function("refresh", |b| {
        let mut counter = 0usize;
        b.iter(|| {
            counter += 1;
            let node_id = format!("node-{:04}", counter % FLEET_SIZE);
            black_box(registry.refresh(black_box(&node_id)));
        });
    });

    group.finish();
}

fn bench_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_registry");
    group.throughput(Throughput::Elements(FLEET_SIZE as u64));

    let (registry, _) = populated_registry();

    group.bench_function("list_snapshot", |b| {
        b.iter(|| black_box(registry.list()));
    });

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_registry");
    group.throughput(Throughput::Elements(FLEET_SIZE as u64));

    let timeout = Duration::from_secs(180);

    group.bench_function("sweep_all_fresh", |b| {
        let (registry, _) = populated_registry();
        b.iter(|| black_box(registry.sweep_stale(black_box(timeout))));
    });

    group.bench_function("sweep_all_stale", |b| {
        b.iter_batched(
            || {
                let (registry, clock) = populated_registry();
                clock.advance(Duration::from_secs(600));
                registry
            },
            |registry| black_box(registry.sweep_stale(timeout)),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_concurrent_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_registry");
    group.throughput(Throughput::Elements(100));

    let (registry, _) = populated_registry();
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("concurrent_100_refreshes", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut handles = Vec::new();
                for i in 0..100 {
                    let reg = registry.clone();
                    handles.push(tokio::spawn(async move {
                        let node_id = format!("node-{:04}", i % FLEET_SIZE);
                        reg.refresh(&node_id)
                    }));
                }
                for handle in handles {
                    let _ = handle.await;
                }
            });
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_register_nodes,
    bench_refresh,
    bench_list,
    bench_sweep,
    bench_concurrent_refresh,
);
criterion_main!(benches);
