//! On-disk layout of a job workspace.
//!
//! ```text
//! {jobs_root}/{job_id}/
//!     run                     launch script
//!     stdout, stderr          command output
//!     logs/run.log            launch script output
//!     logs/done               {"exitCode": N}
//!     logs/killed             present if the kill handler ran
//!     cluster/{id}/{config,dependencies}/
//!     command/{id}/{config,dependencies}/
//!     applications/{id}/{config,dependencies}/
//!     <job dependencies and attachments>
//! ```

use std::path::{Component, Path, PathBuf};

/// Launch script file name.
pub const RUN_SCRIPT: &str = "run";
/// Log directory name.
pub const LOGS_DIR: &str = "logs";
/// Done sentinel file name, inside `logs/`.
pub const DONE_FILE: &str = "done";
/// Kill sentinel file name, inside `logs/`.
pub const KILLED_FILE: &str = "killed";
/// Launch script output, inside `logs/`.
pub const RUN_LOG: &str = "run.log";
/// Applications directory name.
pub const APPLICATIONS_DIR: &str = "applications";
/// Command directory name.
pub const COMMAND_DIR: &str = "command";
/// Cluster directory name.
pub const CLUSTER_DIR: &str = "cluster";
/// Per-resource configuration subdirectory.
pub const CONFIG_DIR: &str = "config";
/// Per-resource dependency subdirectory.
pub const DEPENDENCIES_DIR: &str = "dependencies";
/// Command stdout file name.
pub const STDOUT_FILE: &str = "stdout";
/// Command stderr file name.
pub const STDERR_FILE: &str = "stderr";

/// Names owned by the runner at the top of a job directory. Job
/// dependencies, attachments and the job setup file may not use them.
pub const RESERVED_NAMES: [&str; 7] = [
    RUN_SCRIPT,
    LOGS_DIR,
    STDOUT_FILE,
    STDERR_FILE,
    CLUSTER_DIR,
    COMMAND_DIR,
    APPLICATIONS_DIR,
];

/// Whether `name` collides with a runner-owned entry of the job directory.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Job ids become directory names: ASCII letters, digits, `.`, `_` and `-`,
/// and not made of dots only.
#[must_use]
pub fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && !id.chars().all(|c| c == '.')
}

/// Whether `path` names an entry strictly below `root`, without `..` or `.`
/// components that could escape it.
#[must_use]
pub fn is_strictly_under(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root).is_ok_and(|rest| {
        rest.components().next().is_some()
            && rest.components().all(|c| matches!(c, Component::Normal(_)))
    })
}

/// Paths inside one job's workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLayout {
    job_dir: PathBuf,
}

impl JobLayout {
    /// Layout rooted at `{jobs_root}/{job_id}`.
    pub fn new(jobs_root: &Path, job_id: &str) -> Self {
        Self {
            job_dir: jobs_root.join(job_id),
        }
    }

    /// The job directory.
    #[must_use]
    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    /// Launch script.
    #[must_use]
    pub fn script(&self) -> PathBuf {
        self.job_dir.join(RUN_SCRIPT)
    }

    /// Log directory.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.job_dir.join(LOGS_DIR)
    }

    /// Done sentinel.
    #[must_use]
    pub fn done_file(&self) -> PathBuf {
        self.logs_dir().join(DONE_FILE)
    }

    /// Kill sentinel.
    #[must_use]
    pub fn killed_file(&self) -> PathBuf {
        self.logs_dir().join(KILLED_FILE)
    }

    /// Launch script output.
    #[must_use]
    pub fn run_log(&self) -> PathBuf {
        self.logs_dir().join(RUN_LOG)
    }

    /// Command stdout.
    #[must_use]
    pub fn stdout(&self) -> PathBuf {
        self.job_dir.join(STDOUT_FILE)
    }

    /// Command stderr.
    #[must_use]
    pub fn stderr(&self) -> PathBuf {
        self.job_dir.join(STDERR_FILE)
    }

    /// Parent of all application directories.
    #[must_use]
    pub fn applications_dir(&self) -> PathBuf {
        self.job_dir.join(APPLICATIONS_DIR)
    }

    /// Directory of one application.
    #[must_use]
    pub fn application_dir(&self, id: &str) -> PathBuf {
        self.applications_dir().join(id)
    }

    /// Directory of the command.
    #[must_use]
    pub fn command_dir(&self, id: &str) -> PathBuf {
        self.job_dir.join(COMMAND_DIR).join(id)
    }

    /// Directory of the cluster.
    #[must_use]
    pub fn cluster_dir(&self, id: &str) -> PathBuf {
        self.job_dir.join(CLUSTER_DIR).join(id)
    }
}
