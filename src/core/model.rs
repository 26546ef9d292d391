//! Resource, request and job records shared by every pipeline stage.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;

/// Unordered, case-sensitive set of tags. Duplicates collapse on insert.
pub type TagSet = BTreeSet<String>;

/// Build a [`TagSet`] from anything yielding strings.
pub fn tag_set<I, S>(tags: I) -> TagSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tags.into_iter().map(Into::into).collect()
}

/// Prefix of the id tag added to every registered resource.
pub const ID_TAG_PREFIX: &str = "runner.id:";
/// Prefix of the name tag added to every registered resource.
pub const NAME_TAG_PREFIX: &str = "runner.name:";

/// Job identifier, either supplied by the client or generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random v4 GUID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Cluster availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    /// Accepting jobs.
    Up,
    /// Temporarily not accepting jobs.
    OutOfService,
    /// Gone for good.
    Terminated,
}

impl ClusterStatus {
    /// Whether a cluster in this state may be selected by the matcher.
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::Up)
    }
}

/// Lifecycle status of commands and applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    /// Current.
    Active,
    /// Still usable, scheduled for removal.
    Deprecated,
    /// Never usable.
    Inactive,
}

impl ResourceStatus {
    /// Whether a resource in this state may be used by a job.
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        !matches!(self, Self::Inactive)
    }
}

/// Files a resource contributes to a job workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFiles {
    /// Shell file sourced by the launch script before the command runs.
    #[serde(default)]
    pub setup_file: Option<String>,
    /// Configuration file locations, staged under `config/`.
    #[serde(default)]
    pub configs: Vec<String>,
    /// Dependency file locations, staged under `dependencies/`.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A tagged compute environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Unique identifier.
    pub id: String,
    /// Human readable name.
    pub name: String,
    /// Free-form version string.
    pub version: String,
    /// Tags used for criteria matching.
    pub tags: TagSet,
    /// Availability.
    pub status: ClusterStatus,
    /// Files staged into `cluster/{id}/`.
    #[serde(default)]
    pub files: ResourceFiles,
}

impl Cluster {
    /// New `Up` cluster with the given tags.
    pub fn new<I, S>(id: impl Into<String>, name: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            version: String::new(),
            tags: tag_set(tags),
            status: ClusterStatus::Up,
            files: ResourceFiles::default(),
        }
    }

    /// Set the status.
    #[must_use]
    pub fn with_status(mut self, status: ClusterStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the staged files.
    #[must_use]
    pub fn with_files(mut self, files: ResourceFiles) -> Self {
        self.files = files;
        self
    }
}

/// A tagged executable template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Unique identifier.
    pub id: String,
    /// Human readable name.
    pub name: String,
    /// Free-form version string.
    pub version: String,
    /// Tags used for criteria matching.
    pub tags: TagSet,
    /// Lifecycle status.
    pub status: ResourceStatus,
    /// Files staged into `command/{id}/`.
    #[serde(default)]
    pub files: ResourceFiles,
    /// Shell fragment the job's arguments are appended to.
    pub executable: String,
    /// Default memory for jobs running this command.
    #[serde(default)]
    pub memory_mb: Option<u64>,
}

impl Command {
    /// New `Active` command.
    pub fn new<I, S>(
        id: impl Into<String>,
        name: impl Into<String>,
        executable: impl Into<String>,
        tags: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            version: String::new(),
            tags: tag_set(tags),
            status: ResourceStatus::Active,
            files: ResourceFiles::default(),
            executable: executable.into(),
            memory_mb: None,
        }
    }

    /// Set the status.
    #[must_use]
    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the default memory.
    #[must_use]
    pub fn with_memory(mut self, memory_mb: u64) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    /// Set the staged files.
    #[must_use]
    pub fn with_files(mut self, files: ResourceFiles) -> Self {
        self.files = files;
        self
    }
}

/// A tagged installable dependency of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Unique identifier.
    pub id: String,
    /// Human readable name.
    pub name: String,
    /// Free-form version string.
    pub version: String,
    /// Tags.
    pub tags: TagSet,
    /// Lifecycle status.
    pub status: ResourceStatus,
    /// Files staged into `applications/{id}/`.
    #[serde(default)]
    pub files: ResourceFiles,
}

impl Application {
    /// New `Active` application.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: String::new(),
            tags: TagSet::new(),
            status: ResourceStatus::Active,
            files: ResourceFiles::default(),
        }
    }

    /// Set the status.
    #[must_use]
    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the staged files.
    #[must_use]
    pub fn with_files(mut self, files: ResourceFiles) -> Self {
        self.files = files;
        self
    }
}

/// Raw file uploaded with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name inside the job directory. Must not contain path separators.
    pub name: String,
    /// File contents.
    pub data: Vec<u8>,
}

/// Immutable description of the work a client asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Client supplied id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Job name.
    pub name: String,
    /// Submitting user.
    pub user: String,
    /// Ordered cluster tag-sets; the first one that matches wins.
    pub cluster_criterias: Vec<TagSet>,
    /// Tags the command must carry.
    pub command_criteria: TagSet,
    /// Explicit memory request.
    #[serde(default)]
    pub memory_mb: Option<u64>,
    /// Arguments appended to the command executable.
    #[serde(default)]
    pub command_args: Vec<String>,
    /// Job-level dependency locations.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Raw files uploaded with the request.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Job-level setup file location.
    #[serde(default)]
    pub setup_file: Option<String>,
    /// Wall-clock limit after which the job is killed.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Applications to use instead of the command's linked ones.
    #[serde(default)]
    pub application_ids: Option<Vec<String>>,
    /// Archive the workspace once the job finishes.
    #[serde(default = "default_archive")]
    pub archive: bool,
    /// Free-form job tags.
    #[serde(default)]
    pub tags: TagSet,
}

const fn default_archive() -> bool {
    true
}

impl JobRequest {
    /// Request with no optional fields set.
    pub fn new(
        name: impl Into<String>,
        user: impl Into<String>,
        cluster_criterias: Vec<TagSet>,
        command_criteria: TagSet,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            user: user.into(),
            cluster_criterias,
            command_criteria,
            memory_mb: None,
            command_args: Vec::new(),
            dependencies: Vec::new(),
            attachments: Vec::new(),
            setup_file: None,
            timeout_secs: None,
            application_ids: None,
            archive: true,
            tags: TagSet::new(),
        }
    }

    /// Set the client id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the memory request.
    #[must_use]
    pub fn with_memory(mut self, memory_mb: u64) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    /// Set the command arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Enable or disable archival.
    #[must_use]
    pub fn with_archive(mut self, archive: bool) -> Self {
        self.archive = archive;
        self
    }

    /// Add a job-level dependency.
    #[must_use]
    pub fn with_dependency(mut self, uri: impl Into<String>) -> Self {
        self.dependencies.push(uri.into());
        self
    }

    /// Add an attachment.
    #[must_use]
    pub fn with_attachment(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.attachments.push(Attachment {
            name: name.into(),
            data: data.into(),
        });
        self
    }
}

/// Job state machine.
///
/// `Accepted` covers matching, admission and workspace construction; `Init`
/// is entered once the workspace is ready and before launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Recorded, pipeline running pre-launch stages.
    Accepted,
    /// Workspace built, not yet launched.
    Init,
    /// Process launched and supervised.
    Running,
    /// Exited with code 0.
    Succeeded,
    /// Pipeline failure or non-zero exit.
    Failed,
    /// Killed on request or timeout.
    Killed,
}

impl JobStatus {
    /// No transitions leave a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Killed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Accepted => matches!(next, Self::Init | Self::Failed | Self::Killed),
            Self::Init => matches!(next, Self::Running | Self::Failed | Self::Killed),
            Self::Running => next.is_terminal(),
            Self::Succeeded | Self::Failed | Self::Killed => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accepted => "ACCEPTED",
            Self::Init => "INIT",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
        };
        f.write_str(s)
    }
}

/// Pipeline stage, used to locate failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Request acceptance.
    Submission,
    /// Criteria matching.
    Matching,
    /// Memory admission.
    Admission,
    /// Workspace construction.
    Workspace,
    /// Process launch.
    Launch,
    /// Process supervision.
    Supervision,
    /// Post-terminal housekeeping.
    Cleanup,
}

/// Why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No cluster/command pair matched.
    NoMatch,
    /// Admission refused the memory request.
    InsufficientCapacity,
    /// Workspace construction failed.
    BuildFailure,
    /// The process could not be started.
    LaunchFailure,
    /// The process exited non-zero or vanished without a done file.
    RuntimeFailure,
}

/// Failure recorded against a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Category.
    pub kind: FailureKind,
    /// Where it happened.
    pub stage: Stage,
    /// Human readable cause.
    pub message: String,
}

/// Handle of a launched job process.
///
/// The pid may be reused by the OS after the process exits; a poll interval
/// that straddles such reuse will observe the new process as alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    /// OS process id of the launch script (also its process group id).
    pub pid: u32,
    /// Launch time in milliseconds since the epoch.
    pub started_at_ms: u128,
}

/// Mutable record of a job, from acceptance to terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Identifier.
    pub id: JobId,
    /// The request as accepted.
    pub request: JobRequest,
    /// Current state.
    pub status: JobStatus,
    /// Failure details when `status` is `Failed`.
    pub failure: Option<JobFailure>,
    /// Free-form status message.
    pub status_message: Option<String>,
    /// Matched cluster.
    pub cluster_id: Option<String>,
    /// Matched command.
    pub command_id: Option<String>,
    /// Applications in setup order.
    pub application_ids: Vec<String>,
    /// Reserved memory.
    pub memory_mb: Option<u64>,
    /// Job directory.
    pub workspace: Option<PathBuf>,
    /// Process handle, present whenever the job is `Running`.
    pub process: Option<ProcessHandle>,
    /// Exit code read from the done file.
    pub exit_code: Option<i32>,
    /// Acceptance time.
    pub created_at_ms: u128,
    /// Last mutation time.
    pub updated_at_ms: u128,
    /// Time the job entered `Running`.
    pub started_at_ms: Option<u128>,
    /// Time the job reached a terminal state.
    pub finished_at_ms: Option<u128>,
}

impl Job {
    /// Fresh `Accepted` record.
    #[must_use]
    pub fn accepted(id: JobId, request: JobRequest) -> Self {
        let now = now_ms();
        Self {
            id,
            request,
            status: JobStatus::Accepted,
            failure: None,
            status_message: None,
            cluster_id: None,
            command_id: None,
            application_ids: Vec::new(),
            memory_mb: None,
            workspace: None,
            process: None,
            exit_code: None,
            created_at_ms: now,
            updated_at_ms: now,
            started_at_ms: None,
            finished_at_ms: None,
        }
    }
}
