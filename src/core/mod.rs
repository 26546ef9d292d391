//! Job pipeline components and the domain model they share.

pub mod admission;
pub mod audit;
pub mod cleanup;
pub mod coordinator;
pub mod error;
pub mod layout;
pub mod matcher;
pub mod model;
pub mod script;
pub mod supervisor;
pub mod workspace;

pub use admission::{AdmissionController, Reservation};
pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use cleanup::{CleanupManager, CleanupReport};
pub use coordinator::{Components, JobCoordinator, Spawn};
pub use error::{AppResult, JobError};
pub use layout::JobLayout;
pub use matcher::{
    satisfies, CriteriaMatcher, FirstFound, MatchResult, MatchedPair, RandomSelection,
    SelectionPolicy,
};
pub use model::{
    tag_set, Application, Attachment, Cluster, ClusterStatus, Command, FailureKind, Job,
    JobFailure, JobId, JobRequest, JobStatus, ProcessHandle, ResourceFiles, ResourceStatus, Stage,
    TagSet,
};
pub use supervisor::{
    read_done_file, resolve_outcome, KillReason, LaunchedProcess, SupervisionOutcome, Supervisor,
};
pub use workspace::{BuildFailure, BuildPlan, BuildStep, StepError, Workspace, WorkspaceBuilder};
