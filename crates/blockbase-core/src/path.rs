//! Path types shared by the config store and the model mirror.

use thiserror::Error;

/// Reserved wildcard watch key. Valid as a watch key, never as a top-level
/// data key.
pub const WILDCARD_KEY: &str = "*";

/// A non-empty ordered sequence of string keys addressing into a key/value
/// tree.
pub type GlobalConfigPath = Vec<String>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path must not be empty")]
    Empty,
    #[error("path segment must not be empty")]
    EmptySegment,
    #[error("'{WILDCARD_KEY}' is reserved and cannot be used as a top-level key")]
    WildcardTopLevelKey,
}

/// Structural validation every config path must pass before any host-owned
/// validation runs: non-empty, no empty segments, and `'*'` not at the top
/// level.
pub fn assert_path_is_structurally_valid(path: &[String]) -> Result<(), PathError> {
    let first = path.first().ok_or(PathError::Empty)?;
    if first == WILDCARD_KEY {
        return Err(PathError::WildcardTopLevelKey);
    }
    if path.iter().any(String::is_empty) {
        return Err(PathError::EmptySegment);
    }
    Ok(())
}

/// Formats a path for error messages: `["a", "b"] -> "a.b"`.
pub fn format_path(path: &[String]) -> String {
    path.join(".")
}
