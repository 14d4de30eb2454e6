//! Image naming.
//!
//! Image names are a deterministic function of the request: resubmitting
//! the same request produces the same name (and overwrites the same tag).

use serde_json::{Map, Value};
use url::Url;

use crate::BuildRequest;

const MAX_TAG_LEN: usize = 128;

/// The image name a build of `request` produces.
///
/// If the deploy document is a workload manifest naming its first
/// container's image (`spec.template.spec.containers[0].image`), that name
/// is used. Otherwise the name is `<repo-name>:<branch>`.
pub fn image_name(request: &BuildRequest, deploy: &Map<String, Value>) -> String {
    if let Some(image) = manifest_image(deploy) {
        return image.to_string();
    }

    format!(
        "{}:{}",
        repository_name(request.repo_url()),
        branch_tag(request.repo_branch())
    )
}

fn manifest_image(deploy: &Map<String, Value>) -> Option<&str> {
    deploy
        .get("spec")?
        .pointer("/template/spec/containers/0/image")?
        .as_str()
        .map(str::trim)
        .filter(|image| !image.is_empty())
}

/// Last path segment of the repository URL, without `.git`, lowercased and
/// restricted to the characters allowed in an image repository name.
pub fn repository_name(repo_url: &str) -> String {
    let path = match Url::parse(repo_url) {
        Ok(url) => url.path().to_string(),
        // scp-like: git@host:owner/repo.git
        Err(_) => repo_url
            .split_once(':')
            .map(|(_, path)| path.to_string())
            .unwrap_or_else(|| repo_url.to_string()),
    };

    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let segment = segment.strip_suffix(".git").unwrap_or(segment);

    let name: String = segment
        .to_ascii_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect();
    let name = name.trim_matches(|c| matches!(c, '.' | '_' | '-'));

    if name.is_empty() {
        "build".to_string()
    } else {
        name.to_string()
    }
}

/// A branch or tag name rewritten into a valid image tag.
pub fn branch_tag(branch: &str) -> String {
    let tag: String = branch
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '_' | '.' | '-' => c,
            _ => '-',
        })
        .take(MAX_TAG_LEN)
        .collect();

    // A tag may not start with '.' or '-'.
    let tag = tag.trim_start_matches(['.', '-']);
    if tag.is_empty() {
        "latest".to_string()
    } else {
        tag.to_string()
    }
}
