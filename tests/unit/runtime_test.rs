//! Tests for tokio spawner and API models

use prometheus_job_runner::core::{
    tag_set, FailureKind, Job, JobError, JobFailure, JobId, JobRequest, JobStatus, Spawn, Stage,
};
use prometheus_job_runner::infra::FetchError;
use prometheus_job_runner::runtime::api::{self, JobStatusResponse, JobSubmission};
use prometheus_job_runner::runtime::tokio_spawner::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_submission_deserializes_camel_case() {
    let json = r#"{
        "name": "etl",
        "user": "alice",
        "clusterCriterias": [["type:yarn", "ver:2.7.1"], ["type:yarn"]],
        "commandCriteria": ["type:spark"],
        "memoryMb": 2048,
        "commandArgs": ["--class", "Main"],
        "timeoutSecs": 60
    }"#;
    let submission: JobSubmission = serde_json::from_str(json).unwrap();
    let request = JobRequest::from(submission);

    assert_eq!(request.cluster_criterias.len(), 2);
    assert_eq!(request.cluster_criterias[0], tag_set(["ver:2.7.1", "type:yarn"]));
    assert_eq!(request.command_criteria, tag_set(["type:spark"]));
    assert_eq!(request.memory_mb, Some(2048));
    assert_eq!(request.timeout_secs, Some(60));
    assert!(request.archive);
    assert!(request.id.is_none());
}

#[test]
fn test_duplicate_tags_are_collapsed() {
    let json = r#"{
        "name": "n", "user": "u",
        "clusterCriterias": [["a", "a", "b"]],
        "commandCriteria": ["c", "c"]
    }"#;
    let request = JobRequest::from(serde_json::from_str::<JobSubmission>(json).unwrap());
    assert_eq!(request.cluster_criterias[0].len(), 2);
    assert_eq!(request.command_criteria.len(), 1);
}

#[test]
fn test_status_codes() {
    assert_eq!(api::status_code(&JobError::DuplicateId(JobId::new("x"))), 409);
    assert_eq!(
        api::status_code(&JobError::InsufficientCapacity {
            requested: 1,
            available: 0
        }),
        503
    );
    assert_eq!(
        api::status_code(&JobError::MemoryCeilingExceeded {
            requested: 2,
            ceiling: 1
        }),
        400
    );
    assert_eq!(api::status_code(&JobError::InvalidRequest("x".into())), 400);
    assert_eq!(api::status_code(&JobError::NoMatch("x".into())), 412);
    assert_eq!(
        api::status_code(&JobError::Fetch(FetchError::InvalidUri("x".into()))),
        500
    );
}

#[test]
fn test_status_response_carries_failure() {
    let request = JobRequest::new("n", "u", vec![tag_set(["a"])], tag_set(["b"]));
    let mut job = Job::accepted(JobId::new("j1"), request);
    job.status = JobStatus::Failed;
    job.failure = Some(JobFailure {
        kind: FailureKind::NoMatch,
        stage: Stage::Matching,
        message: "nothing".into(),
    });

    let response = JobStatusResponse::from(job);
    assert_eq!(response.failure_kind, Some(FailureKind::NoMatch));
    assert_eq!(response.failure_stage, Some(Stage::Matching));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "FAILED");
    assert_eq!(json["failureKind"], "no_match");
    assert_eq!(json["jobId"], "j1");
}
