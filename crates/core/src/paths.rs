//! Portable path handling.
//!
//! Paths persisted in manifests and the batch index are stored relative to a
//! root with `/` separators, and resolved against whatever root is current
//! when they are read back. A manifest written on one machine therefore loads
//! on another, regardless of OS or mount point.

use std::path::{Component, Path, PathBuf};

use crate::error::BatchError;

/// Resolves `.` and `..` without touching the filesystem.
///
/// `..` never climbs above the first component, so the result of normalizing
/// `root.join(user_input)` can be compared against `root` directly.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    _ => false,
                };
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Fails with `Security` unless `path` lies within `root` after normalization.
pub fn ensure_within(root: &Path, path: &Path) -> Result<PathBuf, BatchError> {
    let root = normalize(root);
    let candidate = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    };

    if !candidate.starts_with(&root) {
        return Err(BatchError::Security(format!(
            "path {} escapes allowed root {}",
            path.display(),
            root.display()
        )));
    }
    Ok(candidate)
}

/// Converts `path` to a root-relative, forward-slash string.
///
/// Paths outside `root` are kept absolute, still with forward slashes.
pub fn to_portable(root: &Path, path: &Path) -> String {
    let root = normalize(root);
    let path = normalize(path);
    let relative = path.strip_prefix(&root).unwrap_or(&path);

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();

    let joined = parts.join("/");
    if relative.has_root() {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Resolves a portable path against `root`.
///
/// Relative portable paths may not climb out of `root`.
pub fn from_portable(root: &Path, portable: &str) -> Result<PathBuf, BatchError> {
    // Accept backslashes written by older Windows hosts.
    let unified = portable.replace('\\', "/");

    if unified.starts_with('/') {
        return Ok(PathBuf::from(unified));
    }

    let mut relative = PathBuf::new();
    for part in unified.split('/').filter(|p| !p.is_empty()) {
        relative.push(part);
    }
    ensure_within(root, &relative)
}
