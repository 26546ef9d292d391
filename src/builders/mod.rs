//! Builders to assemble a job runner from configuration.

pub mod runner_builder;

pub use runner_builder::{build_runner, RunnerBuilder};
