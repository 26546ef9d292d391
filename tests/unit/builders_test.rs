//! Tests for runner builders

use std::sync::Arc;

use prometheus_job_runner::builders::{build_runner, RunnerBuilder};
use prometheus_job_runner::config::RunnerConfig;
use prometheus_job_runner::core::{FirstFound, InMemoryAuditSink, JobError};
use prometheus_job_runner::infra::{InMemoryJobStore, InMemoryTagStore, LocalFetcher};
use prometheus_job_runner::runtime::{health, TokioSpawner};

#[tokio::test]
async fn test_build_runner_with_defaults() {
    let runner = build_runner(
        RunnerConfig::default(),
        Arc::new(InMemoryTagStore::new()),
        TokioSpawner::current(),
    )
    .unwrap();
    let status = health(&runner);
    assert!(status.ok);
    assert_eq!(status.available_memory_mb, RunnerConfig::default().memory.capacity_mb);
    assert_eq!(status.active_jobs, 0);
}

#[tokio::test]
async fn test_builder_accepts_every_collaborator() {
    let runner = RunnerBuilder::new(RunnerConfig::default())
        .with_tag_store(Arc::new(InMemoryTagStore::new()))
        .with_job_store(Arc::new(InMemoryJobStore::new()))
        .with_fetcher(Arc::new(LocalFetcher))
        .with_selection_policy(Arc::new(FirstFound))
        .with_audit_sink(Arc::new(InMemoryAuditSink::new(16)))
        .build(TokioSpawner::current())
        .unwrap();
    runner.shutdown();
    assert!(runner.is_shutdown());
    assert!(!health(&runner).ok);
}

#[tokio::test]
async fn test_builder_rejects_invalid_config() {
    let mut cfg = RunnerConfig::default();
    cfg.memory.default_job_memory_mb = 0;
    let result = RunnerBuilder::new(cfg).build(TokioSpawner::current());
    assert!(matches!(result, Err(JobError::InvalidConfig(_))));
}
