//! Runtime adapters and API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{health, job_status, kill_job, submit_job, JobStatusResponse, JobSubmission, SubmitResponse};
pub use tokio_spawner::TokioSpawner;
