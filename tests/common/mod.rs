//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use prometheus_job_runner::builders::RunnerBuilder;
use prometheus_job_runner::config::{CleanupConfig, MemoryConfig, RunnerConfig};
use prometheus_job_runner::core::{
    Cluster, Command, FirstFound, InMemoryAuditSink, JobCoordinator,
};
use prometheus_job_runner::infra::InMemoryTagStore;
use prometheus_job_runner::runtime::TokioSpawner;
use tempfile::TempDir;

/// Generous upper bound for a job to finish in tests.
pub const WAIT: Duration = Duration::from_secs(20);

/// Runner wired to temp directories and an in-memory tag store.
pub struct Harness {
    pub dir: TempDir,
    pub tags: Arc<InMemoryTagStore>,
    pub audit: Arc<InMemoryAuditSink>,
    pub runner: JobCoordinator<TokioSpawner>,
}

pub fn config(root: &Path, capacity_mb: u64) -> RunnerConfig {
    RunnerConfig {
        memory: MemoryConfig {
            capacity_mb,
            max_job_memory_mb: capacity_mb,
            default_job_memory_mb: 100,
        },
        jobs_root: root.join("jobs"),
        archive_root: root.join("archives"),
        attachments_root: root.join("attachments"),
        poll_interval_ms: 20,
        kill_grace_secs: 1,
        default_timeout_secs: None,
        cleanup: CleanupConfig::default(),
    }
}

impl Harness {
    /// One `Up` cluster `local` tagged `type:local`, no commands yet.
    pub fn new(capacity_mb: u64) -> Self {
        Self::with_config(|_| {}, capacity_mb)
    }

    pub fn with_config(adjust: impl FnOnce(&mut RunnerConfig), capacity_mb: u64) -> Self {
        Self::build(adjust, capacity_mb, |builder| builder)
    }

    /// Default config, with `customize` swapping collaborators on the builder.
    pub fn with_builder(
        capacity_mb: u64,
        customize: impl FnOnce(RunnerBuilder) -> RunnerBuilder,
    ) -> Self {
        Self::build(|_| {}, capacity_mb, customize)
    }

    fn build(
        adjust: impl FnOnce(&mut RunnerConfig),
        capacity_mb: u64,
        customize: impl FnOnce(RunnerBuilder) -> RunnerBuilder,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), capacity_mb);
        adjust(&mut cfg);

        let tags = Arc::new(InMemoryTagStore::new());
        tags.register_cluster(Cluster::new("local", "local", ["type:local"]));
        let audit = Arc::new(InMemoryAuditSink::new(1024));
        let builder = RunnerBuilder::new(cfg)
            .with_tag_store(tags.clone())
            .with_selection_policy(Arc::new(FirstFound))
            .with_audit_sink(audit.clone());
        let runner = customize(builder)
            .build(TokioSpawner::current())
            .unwrap();
        Self {
            dir,
            tags,
            audit,
            runner,
        }
    }

    /// Register a bash command tagged `type:{name}` and link it to `local`.
    pub fn bash_command(&self, name: &str, script: &str) {
        self.tags.register_command(Command::new(
            name,
            name,
            format!("bash -c {}", shell_quote(script)),
            [format!("type:{name}")],
        ));
        self.tags.link_commands("local", &[name]).unwrap();
    }

    pub fn jobs_root(&self) -> PathBuf {
        self.dir.path().join("jobs")
    }

    pub fn attachments_root(&self) -> PathBuf {
        self.dir.path().join("attachments")
    }

    pub fn archive_root(&self) -> PathBuf {
        self.dir.path().join("archives")
    }

    /// Write a file under the temp dir and return its path as a string.
    pub fn file(&self, name: &str, contents: &str) -> String {
        let path = self.dir.path().join("files").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
