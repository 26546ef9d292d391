//! Error types for job pipeline operations.

use thiserror::Error;

use crate::core::model::{JobId, JobStatus};
use crate::core::workspace::BuildFailure;
use crate::infra::fetch::FetchError;

/// Errors produced by pipeline components.
#[derive(Debug, Error)]
pub enum JobError {
    /// A job with the supplied id already exists.
    #[error("duplicate job id: {0}")]
    DuplicateId(JobId),
    /// The request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The requested memory is above the per-job ceiling.
    #[error("requested memory {requested}MB exceeds the per-job ceiling of {ceiling}MB")]
    MemoryCeilingExceeded {
        /// Memory requested by the job.
        requested: u64,
        /// Administrator-configured ceiling.
        ceiling: u64,
    },
    /// No cluster/command pair satisfies the criteria.
    #[error("no cluster/command satisfies the criteria: {0}")]
    NoMatch(String),
    /// The node does not have enough memory left to admit the job.
    #[error("insufficient capacity: requested {requested}MB, available {available}MB")]
    InsufficientCapacity {
        /// Memory the job needs.
        requested: u64,
        /// Memory still unreserved on this node.
        available: u64,
    },
    /// Workspace construction failed.
    #[error(transparent)]
    Build(#[from] BuildFailure),
    /// The launch script could not be started.
    #[error("launch failed: {0}")]
    Launch(String),
    /// Unknown job or resource.
    #[error("not found: {0}")]
    NotFound(String),
    /// A state-machine transition that is not permitted.
    #[error("illegal transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        /// Job being updated.
        job_id: JobId,
        /// Current state.
        from: JobStatus,
        /// Rejected target state.
        to: JobStatus,
    },
    /// Operation requires a terminal job.
    #[error("job {0} has not reached a terminal state")]
    NotTerminal(JobId),
    /// Dependency retrieval failed outside of a workspace build.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Configuration rejected during validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
