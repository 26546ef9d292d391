//! Runner configuration structures.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Node-local memory budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Total memory, in MB, that running jobs may reserve on this node.
    pub capacity_mb: u64,
    /// Largest memory request a single job may make.
    pub max_job_memory_mb: u64,
    /// Memory assumed when neither the request nor the command specify one.
    pub default_job_memory_mb: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity_mb: 30_720,
            max_job_memory_mb: 10_240,
            default_job_memory_mb: 1_536,
        }
    }
}

/// Post-terminal housekeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Delete staged application dependency files once the job finishes.
    pub delete_dependencies: bool,
    /// Allow workspace archival for jobs that ask for it.
    pub archive_enabled: bool,
    /// Remove the workspace of jobs whose build failed instead of keeping it for diagnostics.
    #[serde(default)]
    pub delete_failed_workspaces: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            delete_dependencies: true,
            archive_enabled: true,
            delete_failed_workspaces: false,
        }
    }
}

/// Root runner configuration, injected into every component at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Memory admission settings.
    pub memory: MemoryConfig,
    /// Parent directory of job workspaces.
    pub jobs_root: PathBuf,
    /// Destination of `{job_id}.tar.gz` archives.
    pub archive_root: PathBuf,
    /// Where request attachments wait until the workspace is built.
    pub attachments_root: PathBuf,
    /// Supervisor liveness-check interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Seconds the kill handler waits between TERM and KILL of the process group.
    pub kill_grace_secs: u64,
    /// Timeout applied to jobs that do not request one.
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
    /// Housekeeping settings.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("prometheus-job-runner");
        Self {
            memory: MemoryConfig::default(),
            jobs_root: base.join("jobs"),
            archive_root: base.join("archives"),
            attachments_root: base.join("attachments"),
            poll_interval_ms: 1_000,
            kill_grace_secs: 5,
            default_timeout_secs: None,
            cleanup: CleanupConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Validate memory settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity_mb == 0 {
            return Err("capacity_mb must be greater than 0".into());
        }
        if self.max_job_memory_mb == 0 {
            return Err("max_job_memory_mb must be greater than 0".into());
        }
        if self.max_job_memory_mb > self.capacity_mb {
            return Err("max_job_memory_mb must not exceed capacity_mb".into());
        }
        if self.default_job_memory_mb == 0 || self.default_job_memory_mb > self.max_job_memory_mb {
            return Err("default_job_memory_mb must be in 1..=max_job_memory_mb".into());
        }
        Ok(())
    }
}

impl RunnerConfig {
    /// Validate all settings.
    pub fn validate(&self) -> Result<(), String> {
        self.memory.validate().map_err(|e| format!("memory: {e}"))?;
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.default_timeout_secs == Some(0) {
            return Err("default_timeout_secs must be greater than 0 when set".into());
        }
        let roots = [&self.jobs_root, &self.archive_root, &self.attachments_root];
        if roots.iter().any(|p| p.as_os_str().is_empty()) {
            return Err("jobs_root, archive_root and attachments_root must be set".into());
        }
        let named = [
            ("jobs_root", &self.jobs_root),
            ("archive_root", &self.archive_root),
            ("attachments_root", &self.attachments_root),
        ];
        for (i, (a_name, a)) in named.iter().enumerate() {
            for (b_name, b) in &named[i + 1..] {
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(format!("{a_name} and {b_name} must be distinct, non-nested directories"));
                }
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read, is not valid JSON, or fails validation.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runner config {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("invalid runner config {}", path.display()))
    }

    /// Defaults overlaid with `RUNNER_*` environment variables, after loading
    /// a `.env` file if one exists.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values returned by `lookup`, keyed by `RUNNER_*` names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = parsed(&lookup, "RUNNER_MEMORY_CAPACITY_MB")? {
            cfg.memory.capacity_mb = v;
        }
        if let Some(v) = parsed(&lookup, "RUNNER_MAX_JOB_MEMORY_MB")? {
            cfg.memory.max_job_memory_mb = v;
        }
        if let Some(v) = parsed(&lookup, "RUNNER_DEFAULT_JOB_MEMORY_MB")? {
            cfg.memory.default_job_memory_mb = v;
        }
        if let Some(v) = lookup("RUNNER_JOBS_ROOT") {
            cfg.jobs_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("RUNNER_ARCHIVE_ROOT") {
            cfg.archive_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("RUNNER_ATTACHMENTS_ROOT") {
            cfg.attachments_root = PathBuf::from(v);
        }
        if let Some(v) = parsed(&lookup, "RUNNER_POLL_INTERVAL_MS")? {
            cfg.poll_interval_ms = v;
        }
        if let Some(v) = parsed(&lookup, "RUNNER_KILL_GRACE_SECS")? {
            cfg.kill_grace_secs = v;
        }
        if let Some(v) = parsed(&lookup, "RUNNER_DEFAULT_TIMEOUT_SECS")? {
            cfg.default_timeout_secs = Some(v);
        }
        if let Some(v) = parsed(&lookup, "RUNNER_DELETE_DEPENDENCIES")? {
            cfg.cleanup.delete_dependencies = v;
        }
        if let Some(v) = parsed(&lookup, "RUNNER_ARCHIVE_ENABLED")? {
            cfg.cleanup.archive_enabled = v;
        }
        if let Some(v) = parsed(&lookup, "RUNNER_DELETE_FAILED_WORKSPACES")? {
            cfg.cleanup.delete_failed_workspaces = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Result<Option<T>, String>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().map_err(|e| format!("{key}: {e}")))
        .transpose()
}
