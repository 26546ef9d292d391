//! Infrastructure adapters: tag store, job store and file retrieval.

pub mod fetch;
pub mod jobs;
pub mod store;

pub use fetch::{FetchError, Fetcher, LocalFetcher};
pub use jobs::{InMemoryJobStore, JobStore, JobUpdate, Resolution};
pub use store::{InMemoryTagStore, TagStore};
