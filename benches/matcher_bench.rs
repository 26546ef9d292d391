//! Benchmarks for the synchronous half of submission.
//!
//! Benchmarks cover:
//! - Tag matching across fleets of increasing size, with and without fallback
//! - Admission reserve/release cycles, single threaded and contended

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use prometheus_job_runner::config::MemoryConfig;
use prometheus_job_runner::core::{
    tag_set, AdmissionController, Cluster, Command, CriteriaMatcher, FirstFound, JobId,
};
use prometheus_job_runner::infra::InMemoryTagStore;

// ============================================================================
// Fixtures
// ============================================================================

/// `clusters` clusters tagged `sched:{n % 4}` and `id:{n}`, each linked to
/// `commands_per_cluster` commands of which only the last is `type:spark`.
fn fleet(clusters: usize, commands_per_cluster: usize) -> CriteriaMatcher {
    let store = Arc::new(InMemoryTagStore::new());
    for c in 0..clusters {
        let cluster_id = format!("cluster-{c}");
        store.register_cluster(Cluster::new(
            cluster_id.as_str(),
            "bench",
            [format!("sched:{}", c % 4), format!("id:{c}"), "type:yarn".to_string()],
        ));
        let ids: Vec<String> = (0..commands_per_cluster)
            .map(|i| {
                let id = format!("cmd-{c}-{i}");
                let kind = if i + 1 == commands_per_cluster { "spark" } else { "hive" };
                store.register_command(Command::new(
                    id.as_str(),
                    "bench",
                    "true",
                    [format!("type:{kind}")],
                ));
                id
            })
            .collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let _ = store.link_commands(&cluster_id, &refs);
    }
    CriteriaMatcher::new(store)
}

// ============================================================================
// Matching
// ============================================================================

fn bench_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching");
    let command = tag_set(["type:spark"]);

    for clusters in [10usize, 100, 1000] {
        let matcher = fleet(clusters, 8);
        group.throughput(Throughput::Elements(clusters as u64));

        let unique = vec![tag_set(["id:3", "type:yarn"])];
        group.bench_with_input(BenchmarkId::new("unique", clusters), &unique, |b, criteria| {
            b.iter(|| black_box(matcher.find_one(criteria, &command, &FirstFound)));
        });

        let fallback = vec![
            tag_set(["sched:9"]),
            tag_set(["id:missing"]),
            tag_set(["sched:1", "type:yarn"]),
        ];
        group.bench_with_input(
            BenchmarkId::new("fallback_ambiguous", clusters),
            &fallback,
            |b, criteria| {
                b.iter(|| black_box(matcher.find(criteria, &command)));
            },
        );
    }
    group.finish();
}

// ============================================================================
// Admission
// ============================================================================

fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission");
    let config = MemoryConfig {
        capacity_mb: 1_000_000,
        max_job_memory_mb: 10_000,
        default_job_memory_mb: 100,
    };

    group.bench_function("reserve_release", |b| {
        let admission = AdmissionController::new(config.clone());
        let job = JobId::new("bench");
        b.iter(|| {
            let _ = black_box(admission.reserve(&job, 512));
            black_box(admission.release(&job));
        });
    });

    for threads in [2usize, 8] {
        group.bench_with_input(
            BenchmarkId::new("contended", threads),
            &threads,
            |b, &threads| {
                let admission = Arc::new(AdmissionController::new(config.clone()));
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let admission = Arc::clone(&admission);
                            std::thread::spawn(move || {
                                for i in 0..100 {
                                    let job = JobId::new(format!("t{t}-{i}"));
                                    if admission.reserve(&job, 1_000).is_ok() {
                                        admission.release(&job);
                                    }
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        let _ = handle.join();
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_matching, bench_admission);
criterion_main!(benches);
