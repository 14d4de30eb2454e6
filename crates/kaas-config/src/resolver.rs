//! Deploy/service config resolution.
//!
//! A [`ConfigRef`] is resolved against the root of a fetched repository:
//! - `Default` reads the slot's default file,
//! - `Path` reads a file at a repository-relative path,
//! - `Inline` is used as-is.
//!
//! Files are YAML (JSON being a subset) and must contain a mapping at the
//! top level.

use kaas_core::{ConfigRef, ConfigSource, Error, ResolvedConfig, Result};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{ErrorKind as IoErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::system::ConfigPaths;

/// Largest config document read from a repository.
pub const MAX_DOCUMENT_BYTES: u64 = 1024 * 1024;

/// Resolves the two config slots of a build request.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    paths: ConfigPaths,
}

impl ConfigResolver {
    pub fn new(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    /// Resolve the deploy config. It is always required.
    pub fn resolve_deploy(&self, config: &ConfigRef, root: &Path) -> Result<ResolvedConfig> {
        let resolved = Self::resolve(config, root, &self.paths.deploy, false)?;
        resolved.ok_or_else(|| Error::MissingConfig {
            path: self.paths.deploy.clone(),
        })
    }

    /// Resolve the service config. A missing default file yields `None`
    /// when the service config is configured as optional.
    pub fn resolve_service(
        &self,
        config: &ConfigRef,
        root: &Path,
    ) -> Result<Option<ResolvedConfig>> {
        Self::resolve(config, root, &self.paths.service, self.paths.service_optional)
    }

    /// Resolve one config reference.
    ///
    /// `optional` only relaxes the `Default` case: an explicitly named file
    /// that does not exist is always an error.
    pub fn resolve(
        config: &ConfigRef,
        root: &Path,
        default_path: &str,
        optional: bool,
    ) -> Result<Option<ResolvedConfig>> {
        match config {
            ConfigRef::Inline(doc) => Ok(Some(ResolvedConfig::new(
                doc.clone(),
                ConfigSource::Inline,
            ))),
            ConfigRef::Path(path) => {
                let document = load_document(root, path)?;
                Ok(Some(ResolvedConfig::new(
                    document,
                    ConfigSource::Path { path: path.clone() },
                )))
            }
            ConfigRef::Default => match load_document(root, default_path) {
                Ok(document) => Ok(Some(ResolvedConfig::new(
                    document,
                    ConfigSource::Default {
                        path: default_path.to_string(),
                    },
                ))),
                Err(Error::MissingConfig { .. }) if optional => {
                    debug!(path = %default_path, "Optional config absent");
                    Ok(None)
                }
                Err(e) => Err(e),
            },
        }
    }
}

/// Parse a config document. The top-level value must be a mapping.
pub fn parse_document(text: &str, origin: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_yaml::from_str(text).map_err(|e| malformed(origin, e))?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(malformed(origin, "expected a mapping at the top level")),
    }
}

fn load_document(root: &Path, relative: &str) -> Result<Map<String, Value>> {
    let path = repo_path(root, relative)?;

    // Symlinks are followed before anything is opened, so a link to a
    // device or to a file outside the repository is never read.
    let resolved = match path.canonicalize() {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == IoErrorKind::NotFound => {
            return Err(Error::MissingConfig {
                path: relative.to_string(),
            });
        }
        Err(e) => return Err(malformed(relative, e)),
    };
    if !resolved.starts_with(root.canonicalize()?) {
        return Err(escape_error(relative));
    }

    let metadata = std::fs::metadata(&resolved).map_err(|e| malformed(relative, e))?;
    if !metadata.is_file() {
        return Err(malformed(relative, "not a regular file"));
    }

    info!(path = %resolved.display(), "Reading config file");

    let mut text = String::new();
    File::open(&resolved)
        .and_then(|file| file.take(MAX_DOCUMENT_BYTES + 1).read_to_string(&mut text))
        .map_err(|e| malformed(relative, e))?;
    if text.len() as u64 > MAX_DOCUMENT_BYTES {
        return Err(malformed(
            relative,
            format!("larger than {} bytes", MAX_DOCUMENT_BYTES),
        ));
    }

    parse_document(&text, relative)
}

fn malformed(origin: &str, reason: impl std::fmt::Display) -> Error {
    Error::MalformedConfig(format!(
        "{} in {}: {}",
        Error::MALFORMED_PAYLOAD,
        origin,
        reason
    ))
}

/// Join a repository-relative path onto the workspace root. A leading `/`
/// means the repository root; `..` and drive prefixes are rejected.
fn repo_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative_path = Path::new(relative.trim_start_matches('/'));

    let escapes = relative_path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || relative_path.as_os_str().is_empty() {
        return Err(escape_error(relative));
    }

    Ok(root.join(relative_path))
}

fn escape_error(relative: &str) -> Error {
    Error::MalformedConfig(format!(
        "{}: config path '{}' is outside the repository",
        Error::MALFORMED_PAYLOAD,
        relative
    ))
}
