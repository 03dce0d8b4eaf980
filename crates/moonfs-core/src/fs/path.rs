//! Virtual path normalization and classification.
//!
//! Paths in the mount namespace are absolute, `/`-separated, and shallow:
//! the first component is the access role, the last component is the file
//! name. One canonical convention applies everywhere: `role` is always the
//! first component and `filename` always the last, even for nested paths.

use crate::error::{FsError, FsResult};

/// Structural classification of a normalized virtual path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualPath<'a> {
    /// The mount root `/`.
    Root,
    /// A top-level role directory, e.g. `/docs`.
    Role(&'a str),
    /// A file entry inside a role, e.g. `/docs/report.txt`.
    Entry { role: &'a str, filename: &'a str },
}

/// Collapse repeated separators and trailing slashes into the canonical
/// absolute form. Rejects relative paths and empty input.
pub fn normalize(path: &str) -> FsResult<String> {
    if path.is_empty() || !path.starts_with('/') {
        return Err(FsError::InvalidInput {
            reason: format!("path must be absolute: {path:?}"),
        });
    }
    let mut out = String::with_capacity(path.len());
    for part in path.split('/').filter(|p| !p.is_empty()) {
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// Classify a normalized path. Input must already be in canonical form.
pub fn classify(path: &str) -> VirtualPath<'_> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [] => VirtualPath::Root,
        [role] => VirtualPath::Role(role),
        // Role is the first component, filename the last, regardless of depth.
        [role, .., filename] => VirtualPath::Entry { role, filename },
    }
}

/// The role component of a path, if it has one.
pub fn role_of(path: &str) -> Option<&str> {
    match classify(path) {
        VirtualPath::Root => None,
        VirtualPath::Role(role) | VirtualPath::Entry { role, .. } => Some(role),
    }
}

/// The final (file name) component of an entry path.
pub fn filename_of(path: &str) -> Option<&str> {
    match classify(path) {
        VirtualPath::Entry { filename, .. } => Some(filename),
        _ => None,
    }
}
