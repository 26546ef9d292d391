//! Configuration models for memory admission, workspaces and supervision.

pub mod runner;

pub use runner::{CleanupConfig, MemoryConfig, RunnerConfig};
