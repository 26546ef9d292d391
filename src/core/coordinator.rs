//! Job pipeline: submission, matching, admission, build, launch, supervision
//! and cleanup, one spawned task per accepted job.
//!
//! The coordinator is the only writer of a job's state between acceptance
//! and its terminal state. Every path out of the pipeline converges on
//! [`finish`](Inner::finish), which records the terminal state, releases
//! the job's memory exactly once, and hands the workspace to cleanup.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::RunnerConfig;
use crate::core::admission::AdmissionController;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::cleanup::CleanupManager;
use crate::core::layout::{is_reserved, is_strictly_under, is_valid_job_id};
use crate::core::matcher::{CriteriaMatcher, MatchedPair, SelectionPolicy};
use crate::core::model::{
    Application, FailureKind, Job, JobFailure, JobId, JobRequest, JobStatus, Stage,
};
use crate::core::supervisor::Supervisor;
use crate::core::workspace::{BuildPlan, WorkspaceBuilder};
use crate::core::JobError;
use crate::infra::fetch::{file_name, Fetcher};
use crate::infra::jobs::{JobStore, JobUpdate, Resolution};
use crate::infra::store::TagStore;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Collaborators a coordinator is assembled from.
pub struct Components {
    /// Resource and link lookups.
    pub tags: Arc<dyn TagStore>,
    /// Job record persistence.
    pub jobs: Arc<dyn JobStore>,
    /// `fetch(uri)` capability.
    pub fetcher: Arc<dyn Fetcher>,
    /// Tie-break for ambiguous matches.
    pub policy: Arc<dyn SelectionPolicy>,
    /// Audit trail.
    pub audit: Arc<dyn AuditSink>,
}

struct Inner {
    config: RunnerConfig,
    tags: Arc<dyn TagStore>,
    jobs: Arc<dyn JobStore>,
    policy: Arc<dyn SelectionPolicy>,
    audit: Arc<dyn AuditSink>,
    matcher: CriteriaMatcher,
    admission: AdmissionController,
    builder: WorkspaceBuilder,
    supervisor: Supervisor,
    cleanup: CleanupManager,
    active: Mutex<HashMap<JobId, CancellationToken>>,
    finished: Notify,
    shutdown: CancellationToken,
}

/// Runs accepted jobs through the pipeline.
pub struct JobCoordinator<S> {
    inner: Arc<Inner>,
    spawner: S,
}

impl<S> JobCoordinator<S>
where
    S: Spawn,
{
    /// Assemble a coordinator. `config` must already be validated.
    pub fn new(config: RunnerConfig, components: Components, spawner: S) -> Self {
        let Components {
            tags,
            jobs,
            fetcher,
            policy,
            audit,
        } = components;
        let inner = Inner {
            matcher: CriteriaMatcher::new(Arc::clone(&tags)),
            admission: AdmissionController::new(config.memory.clone()),
            builder: WorkspaceBuilder::new(&config.jobs_root, config.kill_grace_secs, fetcher),
            supervisor: Supervisor::new(
                config.poll_interval(),
                Duration::from_secs(config.kill_grace_secs),
            ),
            cleanup: CleanupManager::new(
                config.cleanup.clone(),
                &config.jobs_root,
                &config.archive_root,
            ),
            config,
            tags,
            jobs,
            policy,
            audit,
            active: Mutex::new(HashMap::new()),
            finished: Notify::new(),
            shutdown: CancellationToken::new(),
        };
        Self {
            inner: Arc::new(inner),
            spawner,
        }
    }

    /// Accept a request and start its pipeline.
    ///
    /// Matching and admission run before this returns so the caller learns
    /// about `NoMatch` and `InsufficientCapacity` synchronously; both still
    /// leave a `Failed` job record behind.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` / `MemoryCeilingExceeded`: nothing is recorded.
    /// - `DuplicateId`: the existing job is untouched.
    /// - `NoMatch`, `InsufficientCapacity`, `Io`: the job is recorded as `Failed`.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId, JobError> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(JobError::Backend("runner is shutting down".into()));
        }
        validate(&request)?;
        inner.admission.check_request(request.memory_mb)?;

        let job_id = match &request.id {
            Some(id) => JobId::new(id.as_str()),
            None => JobId::generate(),
        };
        inner.jobs.insert(Job::accepted(job_id.clone(), request.clone()))?;
        let cancel = inner.shutdown.child_token();
        inner.active.lock().insert(job_id.clone(), cancel.clone());
        inner.record(&job_id, Stage::Submission, AuditAction::Accept, None);
        tracing::info!(job_id = %job_id, name = %request.name, user = %request.user, "job accepted");

        match inner.prepare(&job_id, &request).await {
            Ok(plan) => {
                let timeout = request
                    .timeout_secs
                    .or(inner.config.default_timeout_secs)
                    .map(Duration::from_secs);
                let pipeline = Arc::clone(inner);
                self.spawner
                    .spawn(async move { pipeline.run(plan, cancel, timeout).await });
                Ok(job_id)
            }
            Err((err, failure)) => {
                inner
                    .record(&job_id, failure.stage, AuditAction::Reject, Some(err.to_string()));
                inner.finish(&job_id, JobStatus::Failed, JobUpdate::failed(failure)).await;
                Err(err)
            }
        }
    }

    /// Request termination of a job. Killing an already terminal job is a no-op.
    ///
    /// # Errors
    ///
    /// `JobError::NotFound` for unknown ids.
    pub fn kill(&self, job_id: &JobId) -> Result<(), JobError> {
        let job = self
            .inner
            .jobs
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(format!("job {job_id}")))?;
        if job.status.is_terminal() {
            return Ok(());
        }
        let token = self.inner.active.lock().get(job_id).cloned();
        if let Some(token) = token {
            if !token.is_cancelled() {
                tracing::info!(job_id = %job_id, status = %job.status, "kill requested");
                self.inner
                    .record(job_id, Stage::Supervision, AuditAction::Kill, Some(job.status.to_string()));
                token.cancel();
            }
        }
        Ok(())
    }

    /// Current status of a job.
    #[must_use]
    pub fn status(&self, job_id: &JobId) -> Option<JobStatus> {
        self.inner.jobs.get(job_id).map(|job| job.status)
    }

    /// Snapshot of a job record.
    #[must_use]
    pub fn job(&self, job_id: &JobId) -> Option<Job> {
        self.inner.jobs.get(job_id)
    }

    /// Wait until a job is terminal and its cleanup has run. Returns the
    /// final record, or `None` if the job is unknown or `timeout` elapses.
    pub async fn await_terminal(&self, job_id: &JobId, timeout: Duration) -> Option<Job> {
        let wait = async {
            loop {
                let notified = self.inner.finished.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let job = self.inner.jobs.get(job_id)?;
                if job.status.is_terminal() && !self.inner.active.lock().contains_key(job_id) {
                    return Some(job);
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }

    /// Memory not reserved by any job.
    #[must_use]
    pub fn available_memory(&self) -> u64 {
        self.inner.admission.available()
    }

    /// Jobs between acceptance and the end of cleanup.
    #[must_use]
    pub fn active_jobs(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Refuse new submissions and kill every active job.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            tracing::info!(active = self.active_jobs(), "shutting down job coordinator");
            self.inner.shutdown.cancel();
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

fn validate(request: &JobRequest) -> Result<(), JobError> {
    if request.cluster_criterias.is_empty() {
        return Err(JobError::InvalidRequest(
            "at least one cluster criteria is required".into(),
        ));
    }
    if let Some(id) = request.id.as_deref() {
        if !is_valid_job_id(id) {
            return Err(JobError::InvalidRequest(format!(
                "invalid job id {id:?}: use ASCII letters, digits, '.', '_' or '-', not only dots"
            )));
        }
    }
    if request.timeout_secs == Some(0) {
        return Err(JobError::InvalidRequest("timeout must be greater than 0".into()));
    }
    for attachment in &request.attachments {
        if attachment.name.contains('/') || file_name(&attachment.name).is_err() {
            return Err(JobError::InvalidRequest(format!(
                "invalid attachment name: {}",
                attachment.name
            )));
        }
        reject_reserved("attachment", &attachment.name)?;
    }
    for uri in request.dependencies.iter().chain(&request.setup_file) {
        let name = file_name(uri).map_err(|e| JobError::InvalidRequest(e.to_string()))?;
        reject_reserved("dependency", &name)?;
    }
    Ok(())
}

fn reject_reserved(what: &str, name: &str) -> Result<(), JobError> {
    if is_reserved(name) {
        return Err(JobError::InvalidRequest(format!(
            "{what} name {name:?} is reserved for the job workspace"
        )));
    }
    Ok(())
}

fn failure(kind: FailureKind, stage: Stage, message: impl Into<String>) -> JobFailure {
    JobFailure {
        kind,
        stage,
        message: message.into(),
    }
}

fn describe(request: &JobRequest) -> String {
    let clusters: Vec<String> = request
        .cluster_criterias
        .iter()
        .map(|c| format!("{c:?}"))
        .collect();
    format!(
        "clusters [{}], command {:?}",
        clusters.join(", "),
        request.command_criteria
    )
}

impl Inner {
    fn record(&self, job_id: &JobId, stage: Stage, action: AuditAction, payload: Option<String>) {
        self.audit
            .record(build_audit_event(job_id, stage, action, payload));
    }

    fn attachments_dir(&self, job_id: &JobId) -> PathBuf {
        self.config.attachments_root.join(job_id.as_str())
    }

    /// Synchronous part of the pipeline: attachments, matching, admission.
    async fn prepare(
        &self,
        job_id: &JobId,
        request: &JobRequest,
    ) -> Result<BuildPlan, (JobError, JobFailure)> {
        let attachments = self.save_attachments(job_id, request).await.map_err(|err| {
            let f = failure(FailureKind::BuildFailure, Stage::Submission, err.to_string());
            (JobError::Io(err), f)
        })?;

        let no_match = |message: String| {
            let f = failure(FailureKind::NoMatch, Stage::Matching, message.clone());
            (JobError::NoMatch(message), f)
        };
        let MatchedPair {
            cluster, command, ..
        } = self
            .matcher
            .find_one(
                &request.cluster_criterias,
                &request.command_criteria,
                self.policy.as_ref(),
            )
            .ok_or_else(|| no_match(describe(request)))?;
        let applications = self.resolve_applications(request, &command.id).map_err(no_match)?;
        tracing::info!(
            job_id = %job_id,
            cluster = %cluster.id,
            command = %command.id,
            applications = applications.len(),
            "criteria matched"
        );

        let memory_mb = self
            .admission
            .resolve_memory(request.memory_mb, command.memory_mb)
            .map_err(|err| {
                let f = failure(FailureKind::InsufficientCapacity, Stage::Admission, err.to_string());
                (err, f)
            })?;
        self.admission.reserve(job_id, memory_mb).map_err(|err| {
            let f = failure(FailureKind::InsufficientCapacity, Stage::Admission, err.to_string());
            (err, f)
        })?;

        let resolution = Resolution {
            cluster_id: cluster.id.clone(),
            command_id: command.id.clone(),
            application_ids: applications.iter().map(|a| a.id.clone()).collect(),
            memory_mb,
        };
        self.jobs.record_resolution(job_id, resolution).map_err(|err| {
            let f = failure(FailureKind::InsufficientCapacity, Stage::Admission, err.to_string());
            (err, f)
        })?;

        Ok(BuildPlan {
            job_id: job_id.clone(),
            request: request.clone(),
            cluster,
            command,
            applications,
            memory_mb,
            attachments,
        })
    }

    async fn save_attachments(
        &self,
        job_id: &JobId,
        request: &JobRequest,
    ) -> std::io::Result<Vec<PathBuf>> {
        if request.attachments.is_empty() {
            return Ok(Vec::new());
        }
        let dir = self.attachments_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        let mut saved = Vec::with_capacity(request.attachments.len());
        for attachment in &request.attachments {
            let path = dir.join(&attachment.name);
            tokio::fs::write(&path, &attachment.data).await?;
            saved.push(path);
        }
        tracing::debug!(job_id = %job_id, count = saved.len(), "attachments saved");
        Ok(saved)
    }

    /// Explicit application ids win over the command's links. Every
    /// application must exist and be eligible.
    fn resolve_applications(
        &self,
        request: &JobRequest,
        command_id: &str,
    ) -> Result<Vec<Application>, String> {
        let applications = match &request.application_ids {
            Some(ids) => ids
                .iter()
                .map(|id| {
                    self.tags
                        .application(id)
                        .ok_or_else(|| format!("application {id} does not exist"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => self.tags.applications_for_command(command_id),
        };
        if let Some(app) = applications.iter().find(|a| !a.status.is_eligible()) {
            return Err(format!("application {} is {:?}", app.id, app.status));
        }
        Ok(applications)
    }

    /// Asynchronous part of the pipeline, from workspace build to cleanup.
    async fn run(self: Arc<Self>, plan: BuildPlan, cancel: CancellationToken, timeout: Option<Duration>) {
        let job_id = plan.job_id.clone();
        let layout = self.builder.layout(&job_id);
        let job_dir = layout.job_dir().to_path_buf();

        let built = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.builder.build(&plan) => Some(result),
        };
        let workspace = match built {
            None => {
                let update = JobUpdate {
                    workspace: Some(job_dir),
                    ..JobUpdate::message("killed during workspace build")
                };
                self.finish(&job_id, JobStatus::Killed, update).await;
                return;
            }
            Some(Err(build_failure)) => {
                tracing::warn!(job_id = %job_id, error = %build_failure, "workspace build failed");
                let update = JobUpdate {
                    workspace: Some(job_dir),
                    ..JobUpdate::failed(failure(
                        FailureKind::BuildFailure,
                        Stage::Workspace,
                        build_failure.to_string(),
                    ))
                };
                self.finish(&job_id, JobStatus::Failed, update).await;
                return;
            }
            Some(Ok(workspace)) => workspace,
        };

        let init = JobUpdate {
            workspace: Some(job_dir),
            ..JobUpdate::message("workspace ready")
        };
        if let Err(err) = self.transition(&job_id, JobStatus::Init, init) {
            let f = failure(FailureKind::LaunchFailure, Stage::Workspace, err.to_string());
            self.finish(&job_id, JobStatus::Failed, JobUpdate::failed(f)).await;
            return;
        }
        if cancel.is_cancelled() {
            self.finish(&job_id, JobStatus::Killed, JobUpdate::message("killed before launch"))
                .await;
            return;
        }

        let process = match self.supervisor.launch(&workspace.layout) {
            Ok(process) => process,
            Err(err) => {
                let f = failure(FailureKind::LaunchFailure, Stage::Launch, err.to_string());
                self.finish(&job_id, JobStatus::Failed, JobUpdate::failed(f)).await;
                return;
            }
        };
        if let Err(err) = self.transition(&job_id, JobStatus::Running, JobUpdate::launched(process.handle)) {
            tracing::warn!(job_id = %job_id, pid = process.handle.pid, "killing unrecorded process group");
            process.kill_group();
            let f = failure(FailureKind::LaunchFailure, Stage::Launch, err.to_string());
            self.finish(&job_id, JobStatus::Failed, JobUpdate::failed(f)).await;
            return;
        }

        let outcome = self
            .supervisor
            .supervise(job_id.clone(), process, workspace.layout, cancel, timeout)
            .await;
        let (status, update) = match outcome {
            Ok(outcome) => {
                let mut update = if outcome.status == JobStatus::Failed {
                    JobUpdate::failed(failure(
                        FailureKind::RuntimeFailure,
                        Stage::Supervision,
                        outcome.message,
                    ))
                } else {
                    JobUpdate::message(outcome.message)
                };
                update.exit_code = outcome.exit_code;
                (outcome.status, update)
            }
            Err(_) => (
                JobStatus::Failed,
                JobUpdate::failed(failure(
                    FailureKind::RuntimeFailure,
                    Stage::Supervision,
                    "supervision task ended without an outcome",
                )),
            ),
        };
        self.finish(&job_id, status, update).await;
    }

    /// Non-terminal transition. On error the caller fails the job.
    fn transition(&self, job_id: &JobId, next: JobStatus, update: JobUpdate) -> Result<(), JobError> {
        match self.jobs.transition(job_id, next, update) {
            Ok(job) => {
                tracing::info!(job_id = %job_id, status = %job.status, "job status changed");
                let stage = if next == JobStatus::Init {
                    Stage::Workspace
                } else {
                    Stage::Launch
                };
                self.record(job_id, stage, AuditAction::Transition, Some(next.to_string()));
                Ok(())
            }
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "job status update rejected");
                Err(err)
            }
        }
    }

    /// Terminal transition, memory release and cleanup.
    async fn finish(&self, job_id: &JobId, status: JobStatus, update: JobUpdate) {
        let stage = update.failure.as_ref().map_or(Stage::Supervision, |f| f.stage);
        let job = match self.jobs.transition(job_id, status, update) {
            Ok(job) => {
                tracing::info!(
                    job_id = %job_id,
                    status = %job.status,
                    exit_code = ?job.exit_code,
                    message = job.status_message.as_deref().unwrap_or(""),
                    "job finished"
                );
                self.record(job_id, stage, AuditAction::Transition, Some(status.to_string()));
                Some(job)
            }
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "terminal status update rejected");
                None
            }
        };

        if let Some(released) = self.admission.release(job_id) {
            tracing::debug!(job_id = %job_id, released, available = self.admission.available(), "memory returned");
        }

        let attachments = self.attachments_dir(job_id);
        if !is_strictly_under(&self.config.attachments_root, &attachments) {
            tracing::error!(job_id = %job_id, dir = %attachments.display(), "refusing to remove attachments outside their root");
        } else if tokio::fs::try_exists(&attachments).await.unwrap_or(false) {
            if let Err(err) = tokio::fs::remove_dir_all(&attachments).await {
                tracing::warn!(job_id = %job_id, error = %err, "failed to remove saved attachments");
            }
        }

        if let Some(job) = job {
            match self.cleanup.finalize(&job).await {
                Ok(report) => {
                    let payload = report.archive.as_ref().map(|p| p.display().to_string());
                    self.record(job_id, Stage::Cleanup, AuditAction::Cleanup, payload);
                }
                Err(err) => tracing::warn!(job_id = %job_id, error = %err, "cleanup skipped"),
            }
        }

        self.active.lock().remove(job_id);
        self.finished.notify_waiters();
    }
}
