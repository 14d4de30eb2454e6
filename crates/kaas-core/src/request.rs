//! Build request model.
//!
//! A [`BuildRequest`] is decoded once by the dispatcher (HTTP body or CLI
//! arguments) and is immutable afterwards. Each config slot is a
//! [`ConfigRef`], resolved later against the fetched repository into a
//! [`ResolvedConfig`].

use serde_json::{Map, Value};
use url::Url;

use crate::{BuildId, Error, Result};

/// Branch used when the request does not name one.
pub const DEFAULT_BRANCH: &str = "main";

const ALLOWED_SCHEMES: &[&str] = &["https", "http", "git", "ssh", "file"];

/// How a configuration document was supplied.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigRef {
    /// Nothing given: read the slot's default path inside the repository.
    Default,
    /// A path relative to the repository root.
    Path(String),
    /// A document supplied directly in the request.
    Inline(Map<String, Value>),
}

impl ConfigRef {
    /// Decode a request field. `null` and absence both select the default
    /// path; scalars other than strings and arrays are rejected.
    pub fn from_json(value: Option<&Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => Ok(ConfigRef::Default),
            Some(Value::String(path)) if !path.trim().is_empty() => {
                Ok(ConfigRef::Path(path.clone()))
            }
            Some(Value::Object(doc)) => Ok(ConfigRef::Inline(doc.clone())),
            Some(_) => Err(Error::malformed_payload()),
        }
    }

    /// Build from an optional path argument, as given on the command line.
    pub fn from_path_arg(path: Option<String>) -> Self {
        match path {
            Some(p) if !p.trim().is_empty() => ConfigRef::Path(p),
            _ => ConfigRef::Default,
        }
    }
}

/// Where a resolved document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Default { path: String },
    Path { path: String },
    Inline,
}

/// A parsed configuration document plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    document: Map<String, Value>,
    source: ConfigSource,
}

impl ResolvedConfig {
    pub fn new(document: Map<String, Value>, source: ConfigSource) -> Self {
        Self { document, source }
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Compact JSON encoding, as forwarded to the build tool.
    pub fn to_json_string(&self) -> String {
        Value::Object(self.document.clone()).to_string()
    }
}

/// A request to build one repository at one branch.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    id: BuildId,
    repo_url: String,
    repo_branch: String,
    deploy_config: ConfigRef,
    service_config: ConfigRef,
}

impl BuildRequest {
    /// Validate and create a request.
    pub fn new(
        repo_url: impl Into<String>,
        repo_branch: Option<String>,
        deploy_config: ConfigRef,
        service_config: ConfigRef,
    ) -> Result<Self> {
        let repo_url = repo_url.into().trim().to_string();
        if repo_url.is_empty() {
            return Err(Error::missing_keys());
        }
        validate_repo_url(&repo_url)?;

        let repo_branch = match repo_branch {
            Some(b) if !b.trim().is_empty() => b.trim().to_string(),
            _ => DEFAULT_BRANCH.to_string(),
        };
        validate_branch(&repo_branch)?;

        Ok(Self {
            id: BuildId::new(),
            repo_url,
            repo_branch,
            deploy_config,
            service_config,
        })
    }

    /// Decode a JSON request document.
    ///
    /// `repo_url` is required; `repo_branch`, `deploy_config` and
    /// `service_config` may be null or absent.
    pub fn from_json(body: &Value) -> Result<Self> {
        let body = body.as_object().ok_or_else(Error::missing_keys)?;

        let repo_url = body
            .get("repo_url")
            .and_then(Value::as_str)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(Error::missing_keys)?;

        let repo_branch = match body.get("repo_branch") {
            None | Some(Value::Null) => None,
            Some(Value::String(branch)) => Some(branch.clone()),
            Some(_) => return Err(Error::BadRequest("invalid repo_branch".to_string())),
        };

        let deploy_config = ConfigRef::from_json(body.get("deploy_config"))?;
        let service_config = ConfigRef::from_json(body.get("service_config"))?;

        Self::new(repo_url, repo_branch, deploy_config, service_config)
    }

    pub fn id(&self) -> BuildId {
        self.id
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    pub fn repo_branch(&self) -> &str {
        &self.repo_branch
    }

    pub fn deploy_config(&self) -> &ConfigRef {
        &self.deploy_config
    }

    pub fn service_config(&self) -> &ConfigRef {
        &self.service_config
    }
}

fn validate_repo_url(repo_url: &str) -> Result<()> {
    let invalid = || Error::BadRequest(format!("invalid repo_url '{}'", repo_url));

    // Anything starting with '-' would be read as an option by the VCS client.
    if repo_url.starts_with('-') || repo_url.chars().any(char::is_control) {
        return Err(invalid());
    }

    if repo_url.contains("://") {
        let url = Url::parse(repo_url).map_err(|_| invalid())?;
        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return Err(invalid());
        }
        return Ok(());
    }

    // scp-like syntax: user@host:owner/repo
    match repo_url.split_once(':') {
        Some((host, path)) if host.contains('@') && !path.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}

fn validate_branch(branch: &str) -> Result<()> {
    let valid = !branch.starts_with('-')
        && !branch.contains("..")
        && branch.len() <= 255
        && !branch
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '~' | '^' | ':' | '\\'));

    if valid {
        Ok(())
    } else {
        Err(Error::BadRequest(format!("invalid repo_branch '{}'", branch)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_decode_minimal_request() {
        let body = json!({
            "repo_url": "https://example.com/ok-repo",
            "repo_branch": null,
            "deploy_config": null,
            "service_config": null
        });

        let req = BuildRequest::from_json(&body).unwrap();
        assert_eq!(req.repo_url(), "https://example.com/ok-repo");
        assert_eq!(req.repo_branch(), "main");
        assert_eq!(req.deploy_config(), &ConfigRef::Default);
        assert_eq!(req.service_config(), &ConfigRef::Default);
    }

    #[test]
    fn test_absent_optional_fields_default() {
        let body = json!({ "repo_url": "https://example.com/ok-repo" });
        let req = BuildRequest::from_json(&body).unwrap();
        assert_eq!(req.repo_branch(), DEFAULT_BRANCH);
        assert_eq!(req.deploy_config(), &ConfigRef::Default);
    }

    #[test]
    fn test_missing_repo_url() {
        let body = json!({ "repo_branch": "main" });
        let err = BuildRequest::from_json(&body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.to_string(), "missing keys");

        let body = json!({ "repo_url": "   " });
        assert_eq!(
            BuildRequest::from_json(&body).unwrap_err().to_string(),
            "missing keys"
        );
    }

    #[test]
    fn test_non_object_body_is_missing_keys() {
        let err = BuildRequest::from_json(&json!(["https://example.com/repo"])).unwrap_err();
        assert_eq!(err.to_string(), "missing keys");
    }

    #[test]
    fn test_config_ref_variants() {
        let body = json!({
            "repo_url": "https://example.com/repo.git",
            "repo_branch": "v1.2.0",
            "deploy_config": "deploy/prod.yml",
            "service_config": { "spec": { "ports": [80] } }
        });

        let req = BuildRequest::from_json(&body).unwrap();
        assert_eq!(req.repo_branch(), "v1.2.0");
        assert_eq!(
            req.deploy_config(),
            &ConfigRef::Path("deploy/prod.yml".to_string())
        );
        match req.service_config() {
            ConfigRef::Inline(doc) => assert_eq!(doc["spec"]["ports"][0], 80),
            other => panic!("expected inline config, got {:?}", other),
        }
    }

    #[test]
    fn test_scalar_config_is_malformed() {
        for bad in [json!(42), json!(true), json!([1, 2]), json!("")] {
            let body = json!({
                "repo_url": "https://example.com/repo",
                "deploy_config": bad,
            });
            let err = BuildRequest::from_json(&body).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedConfig);
            assert_eq!(err.to_string(), "malformed config payload");
        }
    }

    #[test]
    fn test_rejects_option_like_urls_and_branches() {
        let err = BuildRequest::new(
            "--upload-pack=touch /tmp/x",
            None,
            ConfigRef::Default,
            ConfigRef::Default,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = BuildRequest::new(
            "https://example.com/repo",
            Some("--orphan".to_string()),
            ConfigRef::Default,
            ConfigRef::Default,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = BuildRequest::new(
            "ftp://example.com/repo",
            None,
            ConfigRef::Default,
            ConfigRef::Default,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_accepts_scp_like_urls() {
        let req = BuildRequest::new(
            "git@github.com:owner/repo.git",
            Some("feature/login".to_string()),
            ConfigRef::Default,
            ConfigRef::Default,
        )
        .unwrap();
        assert_eq!(req.repo_branch(), "feature/login");
    }

    #[test]
    fn test_each_request_gets_its_own_id() {
        let new = || {
            BuildRequest::new(
                "https://example.com/r",
                None,
                ConfigRef::Default,
                ConfigRef::Default,
            )
            .unwrap()
        };
        let a = new();
        let b = a.clone();
        let c = new();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_resolved_config_json() {
        let doc = json!({ "name": "svc" }).as_object().unwrap().clone();
        let resolved = ResolvedConfig::new(doc, ConfigSource::Inline);
        assert_eq!(resolved.to_json_string(), r#"{"name":"svc"}"#);
        assert_eq!(resolved.source(), &ConfigSource::Inline);
    }
}
