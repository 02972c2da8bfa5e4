use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io failure at `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("could not encode record: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("could not decode `{path}`: {source}")]
    Decode { path: PathBuf, source: serde_json::Error },
    #[error("`{path}` was written with schema version {found}; this build reads up to {supported}")]
    UnsupportedSchema { path: PathBuf, found: u32, supported: u32 },
    #[error("`{0}` is not a plain file name")]
    InvalidName(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io { path: path.to_path_buf(), source }
    }
}

/// Accepts names usable as a single path component: non-empty, no separators,
/// not hidden, and limited to ASCII alphanumerics plus `-`, `_` and `.`.
pub(crate) fn validate_name(name: &str) -> Result<&str, StoreError> {
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && name.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if plain {
        Ok(name)
    } else {
        Err(StoreError::InvalidName(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_name, StoreError};

    #[test]
    fn plain_names_are_accepted() {
        for name in ["scan", "skin-scan", "scan_v2", "photo.jpg"] {
            assert_eq!(validate_name(name).ok(), Some(name));
        }
    }

    #[test]
    fn traversal_and_hidden_names_are_rejected() {
        for name in ["", "..", ".index.json.tmp", "a/b", "a\\b", "../escape", "spa ce"] {
            assert!(
                matches!(validate_name(name), Err(StoreError::InvalidName(_))),
                "`{name}` should be rejected"
            );
        }
    }
}
