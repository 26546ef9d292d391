//! API-facing request/response models.
//!
//! Transport-neutral: handlers translate these into whatever wire protocol
//! fronts the runner. Status codes follow HTTP semantics.

use serde::{Deserialize, Serialize};

use crate::core::{
    tag_set, Attachment, FailureKind, Job, JobCoordinator, JobError, JobId, JobRequest, JobStatus,
    Spawn, Stage, TagSet,
};

/// Pipeline started.
pub const ACCEPTED: u16 = 202;
/// Malformed request or memory above the per-job ceiling.
pub const BAD_REQUEST: u16 = 400;
/// Unknown job.
pub const NOT_FOUND: u16 = 404;
/// Job id already in use.
pub const CONFLICT: u16 = 409;
/// No cluster/command satisfies the criteria. The job record is still
/// persisted as `FAILED` with a `NoMatch` failure at the matching stage, so
/// its status can be queried by id.
pub const PRECONDITION_FAILED: u16 = 412;
/// Unexpected failure.
pub const INTERNAL_ERROR: u16 = 500;
/// Not enough memory on this node, or the runner is shutting down.
pub const SERVICE_UNAVAILABLE: u16 = 503;

const fn default_archive() -> bool {
    true
}

/// Job submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    /// Client supplied id.
    #[serde(default)]
    pub id: Option<String>,
    /// Job name.
    pub name: String,
    /// Submitting user.
    pub user: String,
    /// Ordered cluster tag-sets.
    pub cluster_criterias: Vec<Vec<String>>,
    /// Command tag-set.
    pub command_criteria: Vec<String>,
    /// Explicit memory request.
    #[serde(default)]
    pub memory_mb: Option<u64>,
    /// Arguments appended to the command executable.
    #[serde(default)]
    pub command_args: Vec<String>,
    /// Job-level dependency URIs.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Uploaded files.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Job-level setup file URI.
    #[serde(default)]
    pub setup_file: Option<String>,
    /// Kill the job after this many seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Applications to use instead of the command's linked ones.
    #[serde(default)]
    pub application_ids: Option<Vec<String>>,
    /// Archive the workspace when the job finishes.
    #[serde(default = "default_archive")]
    pub archive: bool,
    /// Free-form job tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<JobSubmission> for JobRequest {
    fn from(sub: JobSubmission) -> Self {
        Self {
            id: sub.id,
            name: sub.name,
            user: sub.user,
            cluster_criterias: sub.cluster_criterias.into_iter().map(tag_set).collect(),
            command_criteria: tag_set(sub.command_criteria),
            memory_mb: sub.memory_mb,
            command_args: sub.command_args,
            dependencies: sub.dependencies,
            attachments: sub.attachments,
            setup_file: sub.setup_file,
            timeout_secs: sub.timeout_secs,
            application_ids: sub.application_ids,
            archive: sub.archive,
            tags: sub.tags.into_iter().collect::<TagSet>(),
        }
    }
}

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// HTTP-style status code.
    pub status_code: u16,
    /// Job id, when a job record exists or was requested.
    pub job_id: Option<String>,
    /// Human readable detail.
    pub message: String,
}

/// Status code for a submission error.
#[must_use]
pub const fn status_code(err: &JobError) -> u16 {
    match err {
        JobError::InvalidRequest(_) | JobError::MemoryCeilingExceeded { .. } => BAD_REQUEST,
        JobError::DuplicateId(_) => CONFLICT,
        JobError::NoMatch(_) => PRECONDITION_FAILED,
        JobError::InsufficientCapacity { .. } | JobError::Backend(_) => SERVICE_UNAVAILABLE,
        JobError::NotFound(_) => NOT_FOUND,
        _ => INTERNAL_ERROR,
    }
}

/// Submit a job. A missing id is generated up front so every response that
/// refers to a job record can name it.
pub async fn submit_job<S: Spawn>(
    coordinator: &JobCoordinator<S>,
    submission: JobSubmission,
) -> SubmitResponse {
    let mut request = JobRequest::from(submission);
    let job_id = request
        .id
        .get_or_insert_with(|| JobId::generate().to_string())
        .clone();

    match coordinator.submit(request).await {
        Ok(id) => SubmitResponse {
            status_code: ACCEPTED,
            job_id: Some(id.to_string()),
            message: "job accepted".into(),
        },
        Err(err) => {
            let status_code = status_code(&err);
            tracing::warn!(job_id = %job_id, status_code, error = %err, "submission rejected");
            SubmitResponse {
                status_code,
                job_id: Some(job_id),
                message: err.to_string(),
            }
        }
    }
}

/// Job status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    /// Job identifier.
    pub job_id: String,
    /// Current status.
    pub status: JobStatus,
    /// Failure category, when failed.
    pub failure_kind: Option<FailureKind>,
    /// Stage the failure happened in.
    pub failure_stage: Option<Stage>,
    /// Latest status message.
    pub message: Option<String>,
    /// Matched cluster.
    pub cluster_id: Option<String>,
    /// Matched command.
    pub command_id: Option<String>,
    /// Applications in setup order.
    pub application_ids: Vec<String>,
    /// Reserved memory.
    pub memory_mb: Option<u64>,
    /// Launch script pid.
    pub pid: Option<u32>,
    /// Exit code.
    pub exit_code: Option<i32>,
    /// Acceptance time (ms since epoch).
    pub created_at_ms: u128,
    /// Launch time.
    pub started_at_ms: Option<u128>,
    /// Terminal time.
    pub finished_at_ms: Option<u128>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            failure_kind: job.failure.as_ref().map(|f| f.kind),
            failure_stage: job.failure.as_ref().map(|f| f.stage),
            message: job.status_message,
            cluster_id: job.cluster_id,
            command_id: job.command_id,
            application_ids: job.application_ids,
            memory_mb: job.memory_mb,
            pid: job.process.map(|p| p.pid),
            exit_code: job.exit_code,
            created_at_ms: job.created_at_ms,
            started_at_ms: job.started_at_ms,
            finished_at_ms: job.finished_at_ms,
        }
    }
}

/// Look up a job's status.
#[must_use]
pub fn job_status<S: Spawn>(coordinator: &JobCoordinator<S>, job_id: &str) -> Option<JobStatusResponse> {
    coordinator.job(&JobId::from(job_id)).map(JobStatusResponse::from)
}

/// Kill a job; returns 202 if the request was delivered or the job already finished.
pub fn kill_job<S: Spawn>(coordinator: &JobCoordinator<S>, job_id: &str) -> u16 {
    match coordinator.kill(&JobId::from(job_id)) {
        Ok(()) => ACCEPTED,
        Err(err) => status_code(&err),
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Memory not reserved by any job.
    pub available_memory_mb: u64,
    /// Jobs currently in the pipeline.
    pub active_jobs: usize,
}

/// Return a health payload.
pub fn health<S: Spawn>(coordinator: &JobCoordinator<S>) -> Health {
    Health {
        ok: !coordinator.is_shutdown(),
        available_memory_mb: coordinator.available_memory(),
        active_jobs: coordinator.active_jobs(),
    }
}
