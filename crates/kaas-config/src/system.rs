//! System configuration parsing.
//!
//! The service reads an optional `kaas.kdl` file:
//!
//! ```kdl
//! server { bind "0.0.0.0"; port 8800 }
//! workspace { dir "/var/tmp/kaas" }
//! git { binary "git"; depth 1; clone-timeout 300; fetch-retries 0 }
//! build { timeout 1800; max-concurrent 4; pull-base-image #true }
//! configs { deploy "kaas.deploy.yml"; service "kaas.service.yml"; service-optional #false }
//! ```
//!
//! Every field has a default; unknown nodes are ignored.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable naming the system config file.
pub const CONFIG_ENV: &str = "KAAS_CONFIG";
/// Config file looked up in the working directory when nothing else is set.
pub const DEFAULT_CONFIG_FILE: &str = "kaas.kdl";

/// System-wide configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
    pub git: GitConfig,
    pub build: BuildConfig,
    pub configs: ConfigPaths,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8800,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceConfig {
    /// Directory under which per-request workspaces are created.
    pub dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("kaas-builds"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GitConfig {
    pub binary: String,
    /// Shallow clone depth; `None` clones full history.
    pub depth: Option<u32>,
    #[serde(serialize_with = "as_seconds")]
    pub clone_timeout: Duration,
    /// Extra attempts after a network failure, each on a fresh workspace.
    pub fetch_retries: u32,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: "git".to_string(),
            depth: Some(1),
            clone_timeout: Duration::from_secs(300),
            fetch_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildConfig {
    #[serde(serialize_with = "as_seconds")]
    pub timeout: Duration,
    /// Upper bound on builds running at once.
    pub max_concurrent: usize,
    /// Pull the Dockerfile's base image for the host platform before building.
    pub pull_base_image: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1800),
            max_concurrent: 4,
            pull_base_image: true,
        }
    }
}

/// Default locations of the two config documents inside a repository.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    pub deploy: String,
    pub service: String,
    /// Treat a missing default service config as absent instead of an error.
    pub service_optional: bool,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            deploy: "kaas.deploy.yml".to_string(),
            service: "kaas.service.yml".to_string(),
            service_optional: false,
        }
    }
}

impl SystemConfig {
    /// Load the system configuration.
    ///
    /// Uses `path` if given, then `$KAAS_CONFIG`, then `./kaas.kdl` if it
    /// exists, and falls back to defaults. Environment overrides
    /// (`KAAS_WORK_DIR`, `KAAS_PORT`) are applied last.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        info!(path = %path.display(), "Loading system config");
        let content = std::fs::read_to_string(path)?;
        parse_system_config(&content)
    }

    /// Apply `KAAS_WORK_DIR` and `KAAS_PORT` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("KAAS_WORK_DIR").filter(|d| !d.is_empty()) {
            self.workspace.dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("KAAS_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "KAAS_PORT".to_string(),
                message: format!("not a port number: {}", port),
            })?;
        }
        Ok(())
    }
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();

    for node in doc.nodes() {
        let Some(children) = node.children() else {
            continue;
        };

        match node.name().value() {
            "server" => {
                for child in children.nodes() {
                    match child.name().value() {
                        "bind" => config.server.bind = required_string(child, "server.bind")?,
                        "port" => config.server.port = integer(child, "server.port")?,
                        _ => {}
                    }
                }
            }
            "workspace" => {
                for child in children.nodes() {
                    if child.name().value() == "dir" {
                        config.workspace.dir =
                            PathBuf::from(required_string(child, "workspace.dir")?);
                    }
                }
            }
            "git" => {
                for child in children.nodes() {
                    match child.name().value() {
                        "binary" => config.git.binary = required_string(child, "git.binary")?,
                        "depth" => {
                            let depth: u32 = integer(child, "git.depth")?;
                            config.git.depth = (depth > 0).then_some(depth);
                        }
                        "clone-timeout" | "clone_timeout" => {
                            config.git.clone_timeout = seconds(child, "git.clone-timeout")?;
                        }
                        "fetch-retries" | "fetch_retries" => {
                            config.git.fetch_retries = integer(child, "git.fetch-retries")?;
                        }
                        _ => {}
                    }
                }
            }
            "build" => {
                for child in children.nodes() {
                    match child.name().value() {
                        "timeout" => config.build.timeout = seconds(child, "build.timeout")?,
                        "max-concurrent" | "max_concurrent" => {
                            let max: usize = integer(child, "build.max-concurrent")?;
                            if max == 0 {
                                return Err(invalid("build.max-concurrent", "must be at least 1"));
                            }
                            config.build.max_concurrent = max;
                        }
                        "pull-base-image" | "pull_base_image" => {
                            config.build.pull_base_image = boolean(child, "build.pull-base-image")?;
                        }
                        _ => {}
                    }
                }
            }
            "configs" => {
                for child in children.nodes() {
                    match child.name().value() {
                        "deploy" => {
                            config.configs.deploy = required_string(child, "configs.deploy")?;
                        }
                        "service" => {
                            config.configs.service = required_string(child, "configs.service")?;
                        }
                        "service-optional" | "service_optional" => {
                            config.configs.service_optional =
                                boolean(child, "configs.service-optional")?;
                        }
                        _ => {}
                    }
                }
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

// Helper functions for extracting values from KDL nodes

fn first_arg(node: &KdlNode) -> Option<&kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn required_string(node: &KdlNode, field: &str) -> ConfigResult<String> {
    first_arg(node)
        .and_then(|v| v.as_string())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| invalid(field, "expected a non-empty string"))
}

fn integer<T: TryFrom<i128>>(node: &KdlNode, field: &str) -> ConfigResult<T> {
    let value = first_arg(node)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| invalid(field, "expected an integer"))?;
    T::try_from(value).map_err(|_| invalid(field, &format!("{} is out of range", value)))
}

/// Durations are written back in whole seconds, as they are configured.
fn as_seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

fn seconds(node: &KdlNode, field: &str) -> ConfigResult<Duration> {
    let secs: u64 = integer(node, field)?;
    if secs == 0 {
        return Err(invalid(field, "timeout must be at least one second"));
    }
    Ok(Duration::from_secs(secs))
}

fn boolean(node: &KdlNode, field: &str) -> ConfigResult<bool> {
    first_arg(node)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| invalid(field, "expected #true or #false"))
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}
