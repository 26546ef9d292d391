//! # Prometheus Job Runner
//!
//! A node-local job execution pipeline. A request names what it needs by
//! tags; the runner resolves those tags to a cluster, a command and its
//! applications, admits the job against the node's memory budget, builds an
//! isolated workspace with a generated launch script, then launches and
//! supervises the process until it reaches a terminal state.
//!
//! ## Pipeline
//!
//! ```text
//! submit -> match -> admit -> build workspace -> launch -> supervise -> cleanup
//!           |         |        |                   |         |
//!           NoMatch   503      BuildFailure        Launch    SUCCEEDED / FAILED / KILLED
//! ```
//!
//! - **Matching** ([`core::matcher`]): ordered cluster criteria with
//!   fallback, first eligible command in the cluster's priority order.
//! - **Admission** ([`core::admission`]): one mutex-guarded counter; reserve
//!   is an atomic check-and-decrement, release is idempotent.
//! - **Workspace** ([`core::workspace`]): an ordered list of build steps,
//!   each failing with a typed error.
//! - **Supervision** ([`core::supervisor`]): one task per job polling the
//!   process and reporting a single outcome.
//! - **Cleanup** ([`core::cleanup`]): dependency pruning and
//!   `{job_id}.tar.gz` archival; failures never change the job's status.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use prometheus_job_runner::builders::RunnerBuilder;
//! use prometheus_job_runner::config::RunnerConfig;
//! use prometheus_job_runner::core::{tag_set, Cluster, Command, JobRequest};
//! use prometheus_job_runner::infra::InMemoryTagStore;
//! use prometheus_job_runner::runtime::TokioSpawner;
//!
//! let tags = Arc::new(InMemoryTagStore::new());
//! tags.register_cluster(Cluster::new("yarn-prod", "yarn", ["type:yarn"]));
//! tags.register_command(Command::new("echo", "echo", "echo", ["type:echo"]));
//! tags.link_commands("yarn-prod", &["echo"])?;
//!
//! let runner = RunnerBuilder::new(RunnerConfig::from_env()?)
//!     .with_tag_store(tags)
//!     .build(TokioSpawner::current())?;
//!
//! let request = JobRequest::new("hello", "alice", vec![tag_set(["type:yarn"])], tag_set(["type:echo"]))
//!     .with_args(["hello"]);
//! let id = runner.submit(request).await?;
//! let job = runner.await_terminal(&id, Duration::from_secs(60)).await;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to assemble a runner from configuration.
pub mod builders;
/// Configuration models for the runner and its components.
pub mod config;
/// Pipeline components and domain model.
pub mod core;
/// Stores and the dependency fetch capability.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
