//! Tests for error types

use prometheus_job_runner::core::{BuildFailure, BuildStep, JobError, JobId, JobStatus, StepError};
use prometheus_job_runner::infra::FetchError;

#[test]
fn test_duplicate_id_error() {
    let err = JobError::DuplicateId(JobId::new("job-1"));
    assert_eq!(format!("{err}"), "duplicate job id: job-1");
}

#[test]
fn test_insufficient_capacity_error() {
    let err = JobError::InsufficientCapacity {
        requested: 400,
        available: 300,
    };
    assert_eq!(
        format!("{err}"),
        "insufficient capacity: requested 400MB, available 300MB"
    );
}

#[test]
fn test_illegal_transition_error() {
    let err = JobError::IllegalTransition {
        job_id: JobId::new("j"),
        from: JobStatus::Succeeded,
        to: JobStatus::Running,
    };
    assert_eq!(
        format!("{err}"),
        "illegal transition for job j: SUCCEEDED -> RUNNING"
    );
}

#[test]
fn test_build_failure_is_transparent() {
    let failure = BuildFailure {
        step: BuildStep::StageCommand,
        source: StepError::Fetch {
            resource: "command:spark".into(),
            source: FetchError::UnsupportedScheme("s3".into()),
        },
    };
    let err = JobError::from(failure);
    let text = err.to_string();
    assert!(text.starts_with("workspace build failed at stage_command"));
    assert!(text.contains("unsupported uri scheme: s3"));
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: JobError = io.into();
    assert!(matches!(err, JobError::Io(_)));
}
