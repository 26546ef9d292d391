//! Job record persistence.
//!
//! The real persistence layer is an external collaborator. The [`JobStore`]
//! trait captures what the pipeline needs from it and enforces the job state
//! machine on every write.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::core::model::{Job, JobFailure, JobId, JobStatus, ProcessHandle};
use crate::core::JobError;
use crate::util::clock::now_ms;

/// Fields written together with a state change.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    /// Failure details.
    pub failure: Option<JobFailure>,
    /// Status message.
    pub message: Option<String>,
    /// Process handle; required when entering `Running`.
    pub process: Option<ProcessHandle>,
    /// Exit code from the done file.
    pub exit_code: Option<i32>,
    /// Job directory.
    pub workspace: Option<PathBuf>,
}

impl JobUpdate {
    /// Update carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Update carrying a failure.
    #[must_use]
    pub fn failed(failure: JobFailure) -> Self {
        Self {
            message: Some(failure.message.clone()),
            failure: Some(failure),
            ..Self::default()
        }
    }

    /// Update for the `Running` transition.
    #[must_use]
    pub fn launched(process: ProcessHandle) -> Self {
        Self {
            process: Some(process),
            ..Self::default()
        }
    }
}

/// Resolution produced by matching and admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Matched cluster.
    pub cluster_id: String,
    /// Matched command.
    pub command_id: String,
    /// Applications in setup order.
    pub application_ids: Vec<String>,
    /// Reserved memory.
    pub memory_mb: u64,
}

/// Persistence operations used by the pipeline.
pub trait JobStore: Send + Sync {
    /// Record a new job.
    ///
    /// # Errors
    ///
    /// `JobError::DuplicateId` if the id is taken; the existing record is untouched.
    fn insert(&self, job: Job) -> Result<(), JobError>;

    /// Fetch a snapshot of a job.
    fn get(&self, id: &JobId) -> Option<Job>;

    /// Record the matched resources and reserved memory.
    ///
    /// # Errors
    ///
    /// `JobError::NotFound` for unknown jobs, `JobError::IllegalTransition` if
    /// the job is already terminal.
    fn record_resolution(&self, id: &JobId, resolution: Resolution) -> Result<(), JobError>;

    /// Move a job to `next`, applying `update` in the same write.
    ///
    /// # Errors
    ///
    /// `JobError::IllegalTransition` if the edge is not part of the state
    /// machine or a `Running` transition lacks a process handle.
    fn transition(&self, id: &JobId, next: JobStatus, update: JobUpdate) -> Result<Job, JobError>;
}

/// In-memory job store for development/testing.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<(), JobError> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(JobError::DuplicateId(job.id));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    fn record_resolution(&self, id: &JobId, resolution: Resolution) -> Result<(), JobError> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(format!("job {id}")))?;
        if job.status.is_terminal() {
            return Err(JobError::IllegalTransition {
                job_id: id.clone(),
                from: job.status,
                to: job.status,
            });
        }
        job.cluster_id = Some(resolution.cluster_id);
        job.command_id = Some(resolution.command_id);
        job.application_ids = resolution.application_ids;
        job.memory_mb = Some(resolution.memory_mb);
        job.updated_at_ms = now_ms();
        Ok(())
    }

    fn transition(&self, id: &JobId, next: JobStatus, update: JobUpdate) -> Result<Job, JobError> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(format!("job {id}")))?;

        let illegal = JobError::IllegalTransition {
            job_id: id.clone(),
            from: job.status,
            to: next,
        };
        if !job.status.can_transition_to(next) {
            return Err(illegal);
        }
        if next == JobStatus::Running && update.process.is_none() {
            return Err(illegal);
        }

        let now = now_ms();
        job.status = next;
        job.updated_at_ms = now;
        if let Some(process) = update.process {
            job.process = Some(process);
            job.started_at_ms = Some(process.started_at_ms);
        }
        if update.failure.is_some() {
            job.failure = update.failure;
        }
        if update.message.is_some() {
            job.status_message = update.message;
        }
        if update.exit_code.is_some() {
            job.exit_code = update.exit_code;
        }
        if update.workspace.is_some() {
            job.workspace = update.workspace;
        }
        if next.is_terminal() {
            job.finished_at_ms = Some(now);
        }
        Ok(job.clone())
    }
}
