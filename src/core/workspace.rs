//! Workspace construction.
//!
//! A build is an ordered list of [`BuildStep`]s. Each step either succeeds or
//! fails with a typed [`StepError`]; the first failure aborts the build and
//! leaves the partial workspace on disk for diagnostics.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::core::layout::{is_reserved, JobLayout, CONFIG_DIR, DEPENDENCIES_DIR};
use crate::core::model::{Application, Cluster, Command, JobId, JobRequest, ResourceFiles, TagSet};
use crate::core::script::{self, ScriptWriter};
use crate::infra::fetch::{file_name, FetchError, Fetcher};

/// Build steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    /// Create `{jobs_root}/{job_id}`.
    CreateJobDir,
    /// Create the launch script with the kill handler.
    CreateScript,
    /// Create `logs/`, `applications/`, `command/`, `cluster/`.
    CreateSubdirs,
    /// Export job-wide variables.
    DefaultEnv,
    /// Stage cluster files and export cluster variables.
    StageCluster,
    /// Stage each application, in link order.
    StageApplications,
    /// Stage command files and export command variables.
    StageCommand,
    /// Stage job dependencies and attachments.
    StageJobDependencies,
    /// Append the launch section and mark the script executable.
    Finalize,
}

impl BuildStep {
    /// Every step, in order.
    pub const ALL: [Self; 9] = [
        Self::CreateJobDir,
        Self::CreateScript,
        Self::CreateSubdirs,
        Self::DefaultEnv,
        Self::StageCluster,
        Self::StageApplications,
        Self::StageCommand,
        Self::StageJobDependencies,
        Self::Finalize,
    ];
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreateJobDir => "create_job_dir",
            Self::CreateScript => "create_script",
            Self::CreateSubdirs => "create_subdirs",
            Self::DefaultEnv => "default_env",
            Self::StageCluster => "stage_cluster",
            Self::StageApplications => "stage_applications",
            Self::StageCommand => "stage_command",
            Self::StageJobDependencies => "stage_job_dependencies",
            Self::Finalize => "finalize",
        };
        f.write_str(s)
    }
}

/// Why a step failed.
#[derive(Debug, Error)]
pub enum StepError {
    /// Directory or script could not be created or written.
    #[error("structural error at {}: {source}", path.display())]
    Structural {
        /// Path being created or written.
        path: PathBuf,
        /// Cause.
        source: std::io::Error,
    },
    /// A file could not be fetched or staged.
    #[error("failed to stage {resource}: {source}")]
    Fetch {
        /// Resource whose file failed (`cluster:x`, `application:y`, `job`).
        resource: String,
        /// Cause.
        source: FetchError,
    },
}

/// A failed build.
#[derive(Debug, Error)]
#[error("workspace build failed at {step}: {source}")]
pub struct BuildFailure {
    /// Step that failed.
    pub step: BuildStep,
    /// Cause.
    pub source: StepError,
}

/// Everything needed to build one workspace.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Job being built.
    pub job_id: JobId,
    /// The accepted request.
    pub request: JobRequest,
    /// Matched cluster.
    pub cluster: Cluster,
    /// Matched command.
    pub command: Command,
    /// Applications in setup order.
    pub applications: Vec<Application>,
    /// Reserved memory.
    pub memory_mb: u64,
    /// Attachments saved at acceptance.
    pub attachments: Vec<PathBuf>,
}

/// A ready-to-launch workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Paths inside the workspace.
    pub layout: JobLayout,
}

/// Builds job workspaces under a jobs root.
#[derive(Clone)]
pub struct WorkspaceBuilder {
    jobs_root: PathBuf,
    kill_grace_secs: u64,
    fetcher: Arc<dyn Fetcher>,
}

fn structural(path: &Path) -> impl FnOnce(std::io::Error) -> StepError + '_ {
    move |source| StepError::Structural {
        path: path.to_path_buf(),
        source,
    }
}

fn joined(tags: &TagSet) -> String {
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl WorkspaceBuilder {
    /// Builder writing under `jobs_root`.
    pub fn new(jobs_root: impl Into<PathBuf>, kill_grace_secs: u64, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            jobs_root: jobs_root.into(),
            kill_grace_secs,
            fetcher,
        }
    }

    /// Layout a job's workspace will have.
    #[must_use]
    pub fn layout(&self, job_id: &JobId) -> JobLayout {
        JobLayout::new(&self.jobs_root, job_id.as_str())
    }

    /// Run every step in order.
    ///
    /// # Errors
    ///
    /// The first failing step, as a [`BuildFailure`].
    pub async fn build(&self, plan: &BuildPlan) -> Result<Workspace, BuildFailure> {
        let layout = self.layout(&plan.job_id);
        let writer = ScriptWriter::new(layout.script());

        for step in BuildStep::ALL {
            tracing::debug!(job_id = %plan.job_id, %step, "workspace step");
            self.run_step(step, plan, &layout, &writer)
                .await
                .map_err(|source| BuildFailure { step, source })?;
        }

        tracing::info!(job_id = %plan.job_id, dir = %layout.job_dir().display(), "workspace ready");
        Ok(Workspace { layout })
    }

    async fn run_step(
        &self,
        step: BuildStep,
        plan: &BuildPlan,
        layout: &JobLayout,
        writer: &ScriptWriter,
    ) -> Result<(), StepError> {
        match step {
            BuildStep::CreateJobDir => {
                tokio::fs::create_dir_all(&self.jobs_root)
                    .await
                    .map_err(structural(&self.jobs_root))?;
                tokio::fs::create_dir(layout.job_dir())
                    .await
                    .map_err(structural(layout.job_dir()))
            }
            BuildStep::CreateScript => writer
                .create(&script::header(layout, self.kill_grace_secs))
                .await
                .map_err(structural(writer.path())),
            BuildStep::CreateSubdirs => {
                let dirs = [
                    layout.logs_dir(),
                    layout.applications_dir(),
                    layout.command_dir(&plan.command.id),
                    layout.cluster_dir(&plan.cluster.id),
                ];
                for dir in &dirs {
                    tokio::fs::create_dir_all(dir).await.map_err(structural(dir))?;
                }
                Ok(())
            }
            BuildStep::DefaultEnv => {
                let requested_clusters = plan
                    .request
                    .cluster_criterias
                    .iter()
                    .map(joined)
                    .collect::<Vec<_>>()
                    .join("|");
                let section = script::comment("job environment")
                    + &script::exports([
                        ("RUNNER_JOB_DIR", path_string(layout.job_dir())),
                        ("RUNNER_JOB_ID", plan.job_id.to_string()),
                        ("RUNNER_JOB_NAME", plan.request.name.clone()),
                        ("RUNNER_JOB_MEMORY", plan.memory_mb.to_string()),
                        ("RUNNER_USER", plan.request.user.clone()),
                        ("RUNNER_REQUESTED_CLUSTER_TAGS", requested_clusters),
                        ("RUNNER_REQUESTED_COMMAND_TAGS", joined(&plan.request.command_criteria)),
                        ("RUNNER_APPLICATION_DIR", path_string(&layout.applications_dir())),
                    ]);
                self.append(writer, &section).await
            }
            BuildStep::StageCluster => {
                let cluster = &plan.cluster;
                let dir = layout.cluster_dir(&cluster.id);
                let setup = self
                    .stage_resource(&cluster.files, &dir, &format!("cluster:{}", cluster.id))
                    .await?;
                let mut section = script::comment(&format!("cluster {}", cluster.id))
                    + &script::exports([
                        ("RUNNER_CLUSTER_DIR", path_string(&dir)),
                        ("RUNNER_CLUSTER_ID", cluster.id.clone()),
                        ("RUNNER_CLUSTER_NAME", cluster.name.clone()),
                        ("RUNNER_CLUSTER_TAGS", joined(&cluster.tags)),
                    ]);
                if let Some(setup) = setup {
                    section += &script::source(&setup);
                }
                self.append(writer, &section).await
            }
            BuildStep::StageApplications => {
                for app in &plan.applications {
                    let dir = layout.application_dir(&app.id);
                    let setup = self
                        .stage_resource(&app.files, &dir, &format!("application:{}", app.id))
                        .await?;
                    let mut section = script::comment(&format!("application {}", app.id));
                    if let Some(setup) = setup {
                        section += &script::source(&setup);
                    }
                    self.append(writer, &section).await?;
                }
                let ids: Vec<&str> = plan.applications.iter().map(|a| a.id.as_str()).collect();
                self.append(writer, &script::exports([("RUNNER_APPLICATION_IDS", ids.join(","))]))
                    .await
            }
            BuildStep::StageCommand => {
                let command = &plan.command;
                let dir = layout.command_dir(&command.id);
                let setup = self
                    .stage_resource(&command.files, &dir, &format!("command:{}", command.id))
                    .await?;
                let mut section = script::comment(&format!("command {}", command.id))
                    + &script::exports([
                        ("RUNNER_COMMAND_DIR", path_string(&dir)),
                        ("RUNNER_COMMAND_ID", command.id.clone()),
                        ("RUNNER_COMMAND_NAME", command.name.clone()),
                        ("RUNNER_COMMAND_TAGS", joined(&command.tags)),
                    ]);
                if let Some(setup) = setup {
                    section += &script::source(&setup);
                }
                self.append(writer, &section).await
            }
            BuildStep::StageJobDependencies => self.stage_job(plan, layout, writer).await,
            BuildStep::Finalize => {
                self.append(
                    writer,
                    &script::launch(layout, &plan.command.executable, &plan.request.command_args),
                )
                .await?;
                writer
                    .make_executable()
                    .await
                    .map_err(structural(writer.path()))
            }
        }
    }

    async fn stage_job(
        &self,
        plan: &BuildPlan,
        layout: &JobLayout,
        writer: &ScriptWriter,
    ) -> Result<(), StepError> {
        let job_dir = layout.job_dir();
        let fetch_err = |source| StepError::Fetch {
            resource: "job".into(),
            source,
        };

        let unreserved = |uri: &str, name: &str| {
            if is_reserved(name) {
                Err(fetch_err(FetchError::InvalidUri(format!(
                    "{uri} would replace the workspace entry {name:?}"
                ))))
            } else {
                Ok(())
            }
        };
        for uri in plan.request.dependencies.iter().chain(&plan.request.setup_file) {
            unreserved(uri.as_str(), &file_name(uri).map_err(fetch_err)?)?;
        }

        for uri in &plan.request.dependencies {
            self.fetcher.fetch(uri, job_dir).await.map_err(fetch_err)?;
        }
        for attachment in &plan.attachments {
            let name = attachment.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned());
            unreserved(path_string(attachment).as_str(), name.as_str())?;
            let dest = job_dir.join(name);
            tokio::fs::copy(attachment, &dest)
                .await
                .map_err(|source| {
                    fetch_err(FetchError::Io {
                        uri: path_string(attachment),
                        source,
                    })
                })?;
        }

        let mut section = script::comment("job")
            + &script::exports([("RUNNER_JOB_TAGS", joined(&plan.request.tags))]);
        if let Some(uri) = &plan.request.setup_file {
            let setup = self.fetcher.fetch(uri, job_dir).await.map_err(fetch_err)?;
            section += &script::source(&setup);
        }
        self.append(writer, &section).await
    }

    /// Fetch a resource's files into `{dir}/config`, `{dir}/dependencies` and
    /// `{dir}` (setup file). Returns the local setup file path.
    async fn stage_resource(
        &self,
        files: &ResourceFiles,
        dir: &Path,
        resource: &str,
    ) -> Result<Option<PathBuf>, StepError> {
        let config_dir = dir.join(CONFIG_DIR);
        let deps_dir = dir.join(DEPENDENCIES_DIR);
        for d in [&config_dir, &deps_dir] {
            tokio::fs::create_dir_all(d).await.map_err(structural(d))?;
        }

        let fetch_err = |source| StepError::Fetch {
            resource: resource.to_string(),
            source,
        };
        for uri in &files.configs {
            self.fetcher.fetch(uri, &config_dir).await.map_err(fetch_err)?;
        }
        for uri in &files.dependencies {
            self.fetcher.fetch(uri, &deps_dir).await.map_err(fetch_err)?;
        }
        match &files.setup_file {
            Some(uri) => Ok(Some(self.fetcher.fetch(uri, dir).await.map_err(fetch_err)?)),
            None => Ok(None),
        }
    }

    async fn append(&self, writer: &ScriptWriter, section: &str) -> Result<(), StepError> {
        writer
            .append(&format!("{section}\n"))
            .await
            .map_err(structural(writer.path()))
    }
}
