//! Image builder trait.
//!
//! Builders turn a populated workspace plus the two resolved configuration
//! documents into a container image.

use async_trait::async_trait;
use std::path::Path;

use crate::{BuildRequest, ResolvedConfig, Result};

/// Everything a builder needs for one build.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub request: &'a BuildRequest,
    /// Root of the populated workspace.
    pub root: &'a Path,
    pub deploy: &'a ResolvedConfig,
    /// `None` when the service config is optional and absent.
    pub service: Option<&'a ResolvedConfig>,
}

#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Name of this builder.
    fn name(&self) -> &'static str;

    /// Check whether the build tool is reachable.
    async fn ping(&self) -> Result<()>;

    /// Build the image and return its name. Failures of the tool are
    /// reported as [`crate::Error::BuildFailed`] with the tool's own
    /// diagnostic text. Implementations never retry.
    async fn build(&self, ctx: BuildContext<'_>) -> Result<String>;
}
