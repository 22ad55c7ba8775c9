//! Mapping between logical keys and coordination-service paths
//!
//! Every entry lives as a direct child of a root node. The empty key is
//! reserved for the root node itself.

use crate::config::ConfigError;

/// Validate a root path and strip a trailing slash (unless the root is `/`).
pub fn normalize_root(root: &str) -> Result<String, ConfigError> {
    if !root.starts_with('/') {
        return Err(ConfigError::InvalidRoot(root.to_string()));
    }
    if root == "/" {
        return Ok(root.to_string());
    }
    Ok(root.strip_suffix('/').unwrap_or(root).to_string())
}

/// Path of the node holding `key` under `root`.
#[must_use]
pub fn child_path(root: &str, key: &str) -> String {
    if key.is_empty() {
        root.to_string()
    } else if root == "/" {
        format!("/{key}")
    } else {
        format!("{root}/{key}")
    }
}

/// Logical key of a direct child of `root`, or `None` for the root itself
/// and for paths outside the root.
#[must_use]
pub fn child_key<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    let rest = if root == "/" {
        path.strip_prefix('/')?
    } else {
        path.strip_prefix(root)?.strip_prefix('/')?
    };
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest)
    }
}

/// Parent of an absolute path; `None` for `/`.
#[must_use]
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}
