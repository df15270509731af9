//! Path validation and normalization.
//!
//! A tree path is a sequence of non-empty segments joined by `/`, with
//! no leading slash and no `.`/`..` segments. Validation happens before
//! any I/O so every backend rejects the same inputs.

use super::{Result, TreeError};

/// Validate a path and return its normalized form.
///
/// A single trailing `/` (directory-shaped input for delete/list) is
/// stripped. Anything else that violates the path rules is an
/// [`TreeError::InvalidPath`].
pub fn normalize_path(path: &str) -> Result<String> {
    let invalid = |reason: &'static str| TreeError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if path.is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.starts_with('/') {
        return Err(invalid("leading slash"));
    }
    if path.contains('\\') {
        return Err(invalid("backslash in path"));
    }
    if path.contains('\0') {
        return Err(invalid("NUL in path"));
    }

    let trimmed = path.strip_suffix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Err(invalid("path is empty"));
    }

    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err(invalid("empty path segment"));
        }
        if segment == "." || segment == ".." {
            return Err(invalid("relative path segment"));
        }
    }

    Ok(trimmed.to_string())
}

/// The lowercase extension of a path's final segment, including the
/// leading dot, or `None` if it has no extension.
pub fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let dot = name.rfind('.')?;
    if dot == 0 {
        // dotfiles like `.gitignore` have no extension
        return None;
    }
    Some(name[dot..].to_ascii_lowercase())
}
