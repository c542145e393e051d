//! Benchmark for the BareMetalHost reverse mapper
//!
//! Maps one host event against a large ClusterConfig snapshot.

use cluster_relocation_controller::controller::mapper::configs_for_host;
use cluster_relocation_controller::{
    BareMetalHost, BareMetalHostReference, BareMetalHostSpec, ClusterConfig, ClusterConfigSpec,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

fn snapshot(size: usize) -> Vec<Arc<ClusterConfig>> {
    (0..size)
        .map(|i| {
            let mut spec = ClusterConfigSpec::with_domain("example.com");
            spec.bare_metal_host_ref = Some(BareMetalHostReference {
                name: format!("host-{:05}", i),
                namespace: "hosts".into(),
            });
            let mut config = ClusterConfig::new(&format!("config-{:05}", i), spec);
            config.metadata.namespace = Some(format!("ns-{}", i % 16));
            Arc::new(config)
        })
        .collect()
}

fn host(name: &str) -> BareMetalHost {
    let mut host = BareMetalHost::new(name, BareMetalHostSpec::default());
    host.metadata.namespace = Some("hosts".into());
    host
}

fn bench_map_host(c: &mut Criterion) {
    let mut group = c.benchmark_group("host_mapping");

    for size in [100usize, 1_000, 10_000] {
        let configs = snapshot(size);
        let target = host(&format!("host-{:05}", size / 2));
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("configs_for_host", size), &configs, |b, configs| {
            b.iter(|| configs_for_host(Some(black_box(&target)), configs.iter().map(Arc::as_ref)))
        });
    }

    group.bench_function("unreferenced_host", |b| {
        let configs = snapshot(1_000);
        let stray = host("stray");
        b.iter(|| configs_for_host(Some(black_box(&stray)), configs.iter().map(Arc::as_ref)))
    });

    group.finish();
}

criterion_group!(benches, bench_map_host);
criterion_main!(benches);
