//! Launch script generation.
//!
//! The script is written in sections as the workspace is built. Its contract
//! with the supervisor:
//!
//! - On normal completion it writes `{"exitCode": N}` to `logs/done` and
//!   exits with the command's exit code.
//! - On SIGTERM/SIGINT the kill handler creates `logs/killed`, writes exit
//!   code [`KILLED_EXIT_CODE`] to `logs/done`, then terminates the script's
//!   process group (TERM, grace period, KILL). The script is launched as
//!   its own process group leader.
//! - If a setup file fails to source, the failing status is written to
//!   `logs/done` and the script exits before the command runs.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::core::layout::JobLayout;

/// Exit code the kill handler records.
pub const KILLED_EXIT_CODE: i32 = 999;

/// Quote `value` for a POSIX shell.
#[must_use]
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// Script prologue: shell options, sentinel helpers, and the kill handler.
#[must_use]
pub fn header(layout: &JobLayout, kill_grace_secs: u64) -> String {
    format!(
        r#"#!/usr/bin/env bash

set -o nounset -o pipefail

DONE_FILE={done}
KILLED_FILE={killed}
KILL_GRACE_SECS={grace}

write_done() {{
    printf '{{"exitCode": %d}}\n' "$1" > "${{DONE_FILE}}"
}}

handle_kill_request() {{
    trap '' TERM INT
    echo "kill signal received, terminating process group $$"
    : > "${{KILLED_FILE}}"
    write_done {killed_code}
    kill -TERM -- -$$ 2>/dev/null
    sleep "${{KILL_GRACE_SECS}}"
    kill -KILL -- -$$ 2>/dev/null
    exit {killed_code}
}}

handle_setup_failure() {{
    echo "setup failed with exit code $1"
    write_done "$1"
    exit "$1"
}}

trap handle_kill_request TERM INT

"#,
        done = quote_path(&layout.done_file()),
        killed = quote_path(&layout.killed_file()),
        grace = kill_grace_secs,
        killed_code = KILLED_EXIT_CODE,
    )
}

/// Section comment.
#[must_use]
pub fn comment(text: &str) -> String {
    format!("# {text}\n")
}

/// `export NAME='value'` lines.
pub fn exports<'a, I>(vars: I) -> String
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    vars.into_iter().fold(String::new(), |mut out, (name, value)| {
        let _ = writeln!(out, "export {name}={}", quote(&value));
        out
    })
}

/// Source a setup file, aborting the script if it fails.
#[must_use]
pub fn source(setup_file: &Path) -> String {
    format!(
        "source {path} || handle_setup_failure $?\n",
        path = quote_path(setup_file)
    )
}

/// Run the command in the background so traps fire while waiting, then record its exit code.
#[must_use]
pub fn launch(layout: &JobLayout, executable: &str, args: &[String]) -> String {
    let mut command_line = executable.trim().to_string();
    for arg in args {
        command_line.push(' ');
        command_line.push_str(&quote(arg));
    }
    format!(
        r#"
cd {job_dir}

{command_line} > {stdout} 2> {stderr} &
wait $!
EXIT_CODE=$?
write_done "${{EXIT_CODE}}"
exit "${{EXIT_CODE}}"
"#,
        job_dir = quote_path(layout.job_dir()),
        stdout = quote_path(&layout.stdout()),
        stderr = quote_path(&layout.stderr()),
    )
}

/// Incrementally written launch script.
#[derive(Debug, Clone)]
pub struct ScriptWriter {
    path: PathBuf,
}

impl ScriptWriter {
    /// Writer for the script at `path`. Nothing is written until [`create`](Self::create).
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Script path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with `contents`. Fails if it already exists.
    pub async fn create(&self, contents: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await
    }

    /// Append a section.
    pub async fn append(&self, section: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(section.as_bytes()).await?;
        file.flush().await
    }

    /// Mark the script executable.
    pub async fn make_executable(&self) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o755)).await
    }
}
