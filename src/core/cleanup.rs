//! Post-terminal housekeeping.

use std::path::{Path, PathBuf};

use crate::config::CleanupConfig;
use crate::core::layout::{is_strictly_under, APPLICATIONS_DIR, DEPENDENCIES_DIR};
use crate::core::model::{FailureKind, Job};
use crate::core::JobError;

/// What [`CleanupManager::finalize`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Dependency directories removed.
    pub pruned: Vec<PathBuf>,
    /// Archive written, if any.
    pub archive: Option<PathBuf>,
    /// Whether the whole workspace was removed.
    pub workspace_removed: bool,
    /// Problems encountered. They never affect the job's status.
    pub errors: Vec<String>,
}

/// Prunes and archives workspaces of finished jobs.
#[derive(Debug, Clone)]
pub struct CleanupManager {
    config: CleanupConfig,
    jobs_root: PathBuf,
    archive_root: PathBuf,
}

impl CleanupManager {
    /// Manager for workspaces under `jobs_root`, writing archives under `archive_root`.
    pub fn new(
        config: CleanupConfig,
        jobs_root: impl Into<PathBuf>,
        archive_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            jobs_root: jobs_root.into(),
            archive_root: archive_root.into(),
        }
    }

    /// Archive path for a job.
    #[must_use]
    pub fn archive_path(&self, job_id: &str) -> PathBuf {
        self.archive_root.join(format!("{job_id}.tar.gz"))
    }

    /// Run cleanup for a terminal job.
    ///
    /// # Errors
    ///
    /// `JobError::NotTerminal` if the job is still active. Every other problem
    /// is logged and returned in [`CleanupReport::errors`].
    pub async fn finalize(&self, job: &Job) -> Result<CleanupReport, JobError> {
        if !job.status.is_terminal() {
            return Err(JobError::NotTerminal(job.id.clone()));
        }
        let mut report = CleanupReport::default();
        let Some(job_dir) = job.workspace.as_deref() else {
            return Ok(report);
        };
        if !is_strictly_under(&self.jobs_root, job_dir) {
            Self::note(
                &mut report,
                job,
                format!("workspace {} is outside {}", job_dir.display(), self.jobs_root.display()),
            );
            return Ok(report);
        }
        if !tokio::fs::try_exists(job_dir).await.unwrap_or(false) {
            return Ok(report);
        }

        let build_failed = job
            .failure
            .as_ref()
            .is_some_and(|f| f.kind == FailureKind::BuildFailure);
        if build_failed && self.config.delete_failed_workspaces {
            match tokio::fs::remove_dir_all(job_dir).await {
                Ok(()) => report.workspace_removed = true,
                Err(err) => Self::note(&mut report, job, format!("failed to remove workspace: {err}")),
            }
            return Ok(report);
        }

        if self.config.delete_dependencies {
            Self::prune_dependencies(job, job_dir, &mut report).await;
        }

        if job.request.archive && self.config.archive_enabled {
            match self.archive(job, job_dir).await {
                Ok(path) => report.archive = Some(path),
                Err(err) => Self::note(&mut report, job, err),
            }
        }

        tracing::info!(
            job_id = %job.id,
            pruned = report.pruned.len(),
            archived = report.archive.is_some(),
            errors = report.errors.len(),
            "cleanup finished"
        );
        Ok(report)
    }

    async fn prune_dependencies(job: &Job, job_dir: &Path, report: &mut CleanupReport) {
        for app_id in &job.application_ids {
            let deps = job_dir.join(APPLICATIONS_DIR).join(app_id).join(DEPENDENCIES_DIR);
            if !tokio::fs::try_exists(&deps).await.unwrap_or(false) {
                continue;
            }
            match tokio::fs::remove_dir_all(&deps).await {
                Ok(()) => {
                    tracing::debug!(job_id = %job.id, dir = %deps.display(), "pruned dependencies");
                    report.pruned.push(deps);
                }
                Err(err) => Self::note(
                    report,
                    job,
                    format!("failed to delete {}: {err}", deps.display()),
                ),
            }
        }
    }

    async fn archive(&self, job: &Job, job_dir: &Path) -> Result<PathBuf, String> {
        tokio::fs::create_dir_all(&self.archive_root)
            .await
            .map_err(|e| format!("failed to create archive root: {e}"))?;
        let path = self.archive_path(job.id.as_str());
        let output = tokio::process::Command::new("tar")
            .arg("-czf")
            .arg(&path)
            .arg("-C")
            .arg(job_dir)
            .arg(".")
            .output()
            .await
            .map_err(|e| format!("failed to run tar: {e}"))?;
        if !output.status.success() {
            return Err(format!(
                "tar exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        tracing::debug!(job_id = %job.id, archive = %path.display(), "workspace archived");
        Ok(path)
    }

    fn note(report: &mut CleanupReport, job: &Job, message: String) {
        tracing::warn!(job_id = %job.id, error = %message, "cleanup step failed");
        report.errors.push(message);
    }
}
