//! Builders to construct a job coordinator from configuration.

use std::sync::Arc;

use crate::config::RunnerConfig;
use crate::core::{
    AuditSink, Components, JobCoordinator, JobError, RandomSelection, SelectionPolicy, Spawn,
    TracingAuditSink,
};
use crate::infra::{Fetcher, InMemoryJobStore, InMemoryTagStore, JobStore, LocalFetcher, TagStore};

/// Assembles a [`JobCoordinator`], defaulting every collaborator that is
/// not supplied: in-memory stores, [`LocalFetcher`], [`RandomSelection`]
/// and [`TracingAuditSink`].
pub struct RunnerBuilder {
    config: RunnerConfig,
    tags: Option<Arc<dyn TagStore>>,
    jobs: Option<Arc<dyn JobStore>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    policy: Option<Arc<dyn SelectionPolicy>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl RunnerBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            tags: None,
            jobs: None,
            fetcher: None,
            policy: None,
            audit: None,
        }
    }

    /// Use `tags` for resource lookups.
    #[must_use]
    pub fn with_tag_store(mut self, tags: Arc<dyn TagStore>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Use `jobs` for job records.
    #[must_use]
    pub fn with_job_store(mut self, jobs: Arc<dyn JobStore>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Use `fetcher` to retrieve dependencies.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Resolve ambiguous matches with `policy`.
    #[must_use]
    pub fn with_selection_policy(mut self, policy: Arc<dyn SelectionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Record audit events in `audit`.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Validate the configuration and build the coordinator.
    ///
    /// # Errors
    ///
    /// `JobError::InvalidConfig` if validation fails.
    pub fn build<S: Spawn>(self, spawner: S) -> Result<JobCoordinator<S>, JobError> {
        self.config
            .validate()
            .map_err(|e| JobError::InvalidConfig(format!("config invalid: {e}")))?;

        let components = Components {
            tags: self
                .tags
                .unwrap_or_else(|| Arc::new(InMemoryTagStore::new())),
            jobs: self
                .jobs
                .unwrap_or_else(|| Arc::new(InMemoryJobStore::new())),
            fetcher: self.fetcher.unwrap_or_else(|| Arc::new(LocalFetcher)),
            policy: self.policy.unwrap_or_else(|| Arc::new(RandomSelection)),
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
        };
        tracing::info!(
            jobs_root = %self.config.jobs_root.display(),
            capacity_mb = self.config.memory.capacity_mb,
            "job runner configured"
        );
        Ok(JobCoordinator::new(self.config, components, spawner))
    }
}

/// Build a coordinator for `cfg` over `tags`, with every other collaborator defaulted.
///
/// # Errors
///
/// `JobError::InvalidConfig` if validation fails.
pub fn build_runner<S: Spawn>(
    cfg: RunnerConfig,
    tags: Arc<dyn TagStore>,
    spawner: S,
) -> Result<JobCoordinator<S>, JobError> {
    RunnerBuilder::new(cfg).with_tag_store(tags).build(spawner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::TokioSpawner;

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut cfg = RunnerConfig::default();
        cfg.poll_interval_ms = 0;
        let err = RunnerBuilder::new(cfg)
            .build(TokioSpawner::current())
            .err()
            .unwrap();
        assert!(matches!(err, JobError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_defaults_build() {
        let coordinator = RunnerBuilder::new(RunnerConfig::default())
            .build(TokioSpawner::current())
            .unwrap();
        assert_eq!(coordinator.available_memory(), 30_720);
        assert_eq!(coordinator.active_jobs(), 0);
    }
}
