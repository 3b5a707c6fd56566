// ABOUTME: Canonical on-disk file name for a container image.
// ABOUTME: Flat names only; path separators and colons are never allowed.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtefactNameError {
    #[error("artefact name cannot be empty")]
    Empty,

    #[error("invalid character in artefact name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtefactName(String);

impl ArtefactName {
    pub fn new(value: &str) -> Result<Self, ArtefactNameError> {
        if value.is_empty() {
            return Err(ArtefactNameError::Empty);
        }
        if let Some(c) = value.chars().find(|c| matches!(c, '/' | ':')) {
            return Err(ArtefactNameError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    /// Wraps a name already produced by the canonicaliser.
    pub(crate) fn from_canonical(value: String) -> Self {
        debug_assert!(!value.is_empty() && !value.contains(['/', ':']));
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for ArtefactName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl fmt::Display for ArtefactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
