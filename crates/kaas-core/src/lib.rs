//! Core domain types and traits for the KaaS build service.
//!
//! This crate contains:
//! - Request identifiers and the build request model
//! - Configuration references (default / path / inline)
//! - The per-request workspace and its disposal guarantees
//! - Fetcher and image builder traits
//! - The error taxonomy shared by every pipeline stage

pub mod builder;
pub mod error;
pub mod fetcher;
pub mod id;
pub mod image;
pub mod request;
pub mod workspace;

pub use error::{Error, ErrorKind, Result};
pub use id::{BuildId, WorkspaceId};
pub use request::{BuildRequest, ConfigRef, ConfigSource, ResolvedConfig};
pub use workspace::{Workspace, WorkspaceState};
