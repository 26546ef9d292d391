//! Process launch and supervision.
//!
//! Each running job is owned by one supervision task. The task polls the
//! process on a fixed interval, turns kill requests and timeouts into a
//! SIGTERM to the launch script, and sends exactly one
//! [`SupervisionOutcome`] back through a oneshot channel once the process is
//! gone.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::layout::JobLayout;
use crate::core::model::{JobId, JobStatus, ProcessHandle};
use crate::core::script::KILLED_EXIT_CODE;
use crate::core::JobError;
use crate::util::clock::now_ms;

/// Why the supervisor signalled the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    /// Explicit kill request or shutdown.
    Requested,
    /// The job's timeout elapsed.
    Timeout,
}

/// Terminal result of supervision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisionOutcome {
    /// `Succeeded`, `Failed` or `Killed`.
    pub status: JobStatus,
    /// Exit code from the done file, if one was written.
    pub exit_code: Option<i32>,
    /// Set when the supervisor signalled the process.
    pub kill_reason: Option<KillReason>,
    /// Human readable summary.
    pub message: String,
}

/// A started launch script.
#[derive(Debug)]
pub struct LaunchedProcess {
    /// Handle to persist with the `Running` transition.
    pub handle: ProcessHandle,
    child: Option<Child>,
}

impl LaunchedProcess {
    /// Supervise a process this runner did not spawn, by pid only.
    #[must_use]
    pub fn attach(handle: ProcessHandle) -> Self {
        Self {
            handle,
            child: None,
        }
    }

    fn pid(&self) -> Option<Pid> {
        nix_pid(self.handle.pid)
    }

    fn is_alive(&mut self) -> bool {
        let raw = self.handle.pid;
        match self.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(pid = raw, %status, "launch script exited");
                    false
                }
                Ok(None) => true,
                Err(err) => {
                    tracing::warn!(pid = raw, error = %err, "failed to poll process");
                    false
                }
            },
            None => nix_pid(raw)
                .is_some_and(|pid| !matches!(signal::kill(pid, None), Err(Errno::ESRCH))),
        }
    }

    fn signal(&self, sig: Signal) {
        let Some(pid) = self.pid() else {
            return;
        };
        if let Err(err) = signal::kill(pid, sig) {
            tracing::warn!(pid = self.handle.pid, signal = ?sig, error = %err, "failed to signal process");
        }
    }

    /// SIGKILL the launch script's whole process group.
    pub fn kill_group(&self) {
        let Some(pid) = self.pid() else {
            return;
        };
        if let Err(err) = signal::killpg(pid, Signal::SIGKILL) {
            tracing::debug!(pid = self.handle.pid, error = %err, "process group already gone");
        }
    }
}

fn nix_pid(raw: u32) -> Option<Pid> {
    i32::try_from(raw).ok().map(Pid::from_raw)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DoneFile {
    exit_code: i32,
}

/// Exit code recorded in a done file, or `None` if it is missing or unreadable.
pub async fn read_done_file(path: &Path) -> Option<i32> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str::<DoneFile>(&contents) {
        Ok(done) => Some(done.exit_code),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "malformed done file");
            None
        }
    }
}

/// Map what the process left behind to a terminal state.
///
/// The kill marker wins over any exit code. Without it, the done file
/// decides. A process that vanished without a done file is `Killed` if the
/// supervisor signalled it and `Failed` otherwise.
#[must_use]
pub fn resolve_outcome(
    exit_code: Option<i32>,
    killed_marker: bool,
    kill_reason: Option<KillReason>,
) -> SupervisionOutcome {
    let (status, message) = match (killed_marker, exit_code) {
        (true, _) => (JobStatus::Killed, killed_message(kill_reason)),
        (false, Some(0)) => (JobStatus::Succeeded, "job finished successfully".to_string()),
        (false, Some(code)) => (JobStatus::Failed, format!("job failed with exit code {code}")),
        (false, None) if kill_reason.is_some() => (JobStatus::Killed, killed_message(kill_reason)),
        (false, None) => (
            JobStatus::Failed,
            "process exited without writing a done file".to_string(),
        ),
    };
    let exit_code = match status {
        JobStatus::Killed => exit_code.or(Some(KILLED_EXIT_CODE)),
        _ => exit_code,
    };
    SupervisionOutcome {
        status,
        exit_code,
        kill_reason,
        message,
    }
}

fn killed_message(reason: Option<KillReason>) -> String {
    match reason {
        Some(KillReason::Timeout) => "job exceeded its timeout and was killed".into(),
        _ => "job was killed".into(),
    }
}

/// Launches launch scripts and supervises the resulting processes.
#[derive(Debug, Clone, Copy)]
pub struct Supervisor {
    poll_interval: Duration,
    kill_grace: Duration,
}

impl Supervisor {
    /// Poll every `poll_interval`. `kill_grace` is the launch script's delay
    /// between TERM and KILL; the supervisor escalates itself if the process
    /// outlives it.
    #[must_use]
    pub const fn new(poll_interval: Duration, kill_grace: Duration) -> Self {
        Self {
            poll_interval,
            kill_grace,
        }
    }

    /// Start the launch script as its own process group leader, with its
    /// output captured to `logs/run.log`.
    ///
    /// # Errors
    ///
    /// `JobError::Launch` if the log file cannot be created or the process
    /// cannot be spawned.
    pub fn launch(&self, layout: &JobLayout) -> Result<LaunchedProcess, JobError> {
        let launch_err = |what: &str, err: std::io::Error| JobError::Launch(format!("{what}: {err}"));

        let log = std::fs::File::create(layout.run_log())
            .map_err(|e| launch_err("failed to create run log", e))?;
        let err_log = log
            .try_clone()
            .map_err(|e| launch_err("failed to create run log", e))?;

        let child = tokio::process::Command::new("bash")
            .arg(layout.script())
            .current_dir(layout.job_dir())
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(err_log)
            .process_group(0)
            .spawn()
            .map_err(|e| launch_err("failed to spawn launch script", e))?;

        let pid = child
            .id()
            .ok_or_else(|| JobError::Launch("process exited before its pid was read".into()))?;
        tracing::info!(pid, script = %layout.script().display(), "launch script started");

        Ok(LaunchedProcess {
            handle: ProcessHandle {
                pid,
                started_at_ms: now_ms(),
            },
            child: Some(child),
        })
    }

    /// Spawn the supervision task for `process`.
    ///
    /// Cancelling `cancel` or reaching `timeout` sends SIGTERM to the launch
    /// script, whose handler tears down the process group.
    pub fn supervise(
        &self,
        job_id: JobId,
        mut process: LaunchedProcess,
        layout: JobLayout,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> oneshot::Receiver<SupervisionOutcome> {
        let (tx, rx) = oneshot::channel();
        let poll_interval = self.poll_interval;
        let escalate_after = self.kill_grace + poll_interval * 2;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let deadline = timeout.map(|t| Instant::now() + t);
            let expiry = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(expiry);

            let mut kill: Option<(KillReason, Instant)> = None;
            let mut escalated = false;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !process.is_alive() {
                            break;
                        }
                        if let Some((_, sent_at)) = kill {
                            if !escalated && sent_at.elapsed() > escalate_after {
                                tracing::warn!(job_id = %job_id, "process outlived kill grace, sending SIGKILL");
                                process.kill_group();
                                escalated = true;
                            }
                        }
                    }
                    () = cancel.cancelled(), if kill.is_none() => {
                        tracing::info!(job_id = %job_id, pid = process.handle.pid, "kill requested");
                        process.signal(Signal::SIGTERM);
                        kill = Some((KillReason::Requested, Instant::now()));
                    }
                    () = &mut expiry, if kill.is_none() && deadline.is_some() => {
                        tracing::info!(job_id = %job_id, pid = process.handle.pid, "timeout elapsed");
                        process.signal(Signal::SIGTERM);
                        kill = Some((KillReason::Timeout, Instant::now()));
                    }
                }
            }

            let exit_code = read_done_file(&layout.done_file()).await;
            let killed_marker = tokio::fs::try_exists(layout.killed_file())
                .await
                .unwrap_or(false);
            let outcome = resolve_outcome(exit_code, killed_marker, kill.map(|(reason, _)| reason));
            tracing::info!(
                job_id = %job_id,
                status = %outcome.status,
                exit_code = ?outcome.exit_code,
                "supervision finished"
            );
            if tx.send(outcome).is_err() {
                tracing::debug!(job_id = %job_id, "supervision outcome dropped, receiver gone");
            }
        });

        rx
    }
}
