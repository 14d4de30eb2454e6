//! Fetch and build backends for the KaaS build service.
//!
//! Provides:
//! - `git` CLI repository fetcher
//! - Local Docker image builder (bollard)

pub mod context;
pub mod docker;
pub mod git;

pub use docker::DockerImageBuilder;
pub use git::GitFetcher;
pub use kaas_core::builder::{BuildContext, ImageBuilder};
pub use kaas_core::fetcher::RepositoryFetcher;
