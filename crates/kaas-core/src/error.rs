//! Error types for the build pipeline.

use std::time::Duration;
use thiserror::Error;

/// Stable classification of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    MissingConfig,
    MalformedConfig,
    RepoUnreachable,
    BranchNotFound,
    FetchFailed,
    MissingBuildDescriptor,
    BuildFailed,
    Timeout,
    Cancelled,
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("config file not found in repo or specified in request: {path}")]
    MissingConfig { path: String },

    #[error("{0}")]
    MalformedConfig(String),

    #[error("unable to clone repo: {0}")]
    RepoUnreachable(String),

    #[error("unable to checkout branch '{branch}'")]
    BranchNotFound { branch: String },

    #[error("network failure while cloning repo: {0}")]
    FetchFailed(String),

    #[error("build descriptor not found: {path} is missing from the repository root")]
    MissingBuildDescriptor { path: String },

    /// Diagnostic text from the build tool, carried verbatim.
    #[error("{0}")]
    BuildFailed(String),

    #[error("{stage} timed out after {}s", .after.as_secs())]
    Timeout { stage: &'static str, after: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The message used when a config slot carries something other than
    /// null, a path string or an object.
    pub const MALFORMED_PAYLOAD: &'static str = "malformed config payload";

    pub fn missing_keys() -> Self {
        Error::BadRequest("missing keys".to_string())
    }

    pub fn malformed_payload() -> Self {
        Error::MalformedConfig(Self::MALFORMED_PAYLOAD.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadRequest(_) => ErrorKind::BadRequest,
            Error::MissingConfig { .. } => ErrorKind::MissingConfig,
            Error::MalformedConfig(_) => ErrorKind::MalformedConfig,
            Error::RepoUnreachable(_) => ErrorKind::RepoUnreachable,
            Error::BranchNotFound { .. } => ErrorKind::BranchNotFound,
            Error::FetchFailed(_) => ErrorKind::FetchFailed,
            Error::MissingBuildDescriptor { .. } => ErrorKind::MissingBuildDescriptor,
            Error::BuildFailed(_) => ErrorKind::BuildFailed,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the failure was caused by the caller's input rather than by
    /// the repository, the tools or the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::BadRequest | ErrorKind::MissingConfig | ErrorKind::MalformedConfig
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
