//! Build context archiving.

use kaas_core::Result;
use std::path::Path;
use tracing::{debug, warn};

/// Directories never sent to the build tool.
const EXCLUDED: &[&str] = &[".git"];

const LARGE_CONTEXT: usize = 500 * 1024 * 1024;

/// Archive a workspace as an uncompressed tar build context.
///
/// Symlinks are archived as links rather than followed, so a repository
/// cannot pull files from outside its workspace into the context.
pub fn create_context(root: &Path) -> Result<Vec<u8>> {
    debug!(path = %root.display(), "Creating build context");

    let mut tar = tar::Builder::new(Vec::new());
    tar.follow_symlinks(false);

    let mut entries: Vec<_> = std::fs::read_dir(root)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        if EXCLUDED.iter().any(|ex| name == *ex) {
            continue;
        }

        let path = entry.path();
        if entry.file_type()?.is_dir() {
            tar.append_dir_all(&name, &path)?;
        } else {
            tar.append_path_with_name(&path, &name)?;
        }
    }

    let archive = tar.into_inner()?;
    debug!(bytes = archive.len(), "Build context created");

    if archive.len() > LARGE_CONTEXT {
        warn!(
            megabytes = archive.len() / 1024 / 1024,
            "Build context is very large"
        );
    }

    Ok(archive)
}
