// ABOUTME: Container reference parsing as workflows write them.
// ABOUTME: Handles bare names, docker://, oras://, library:// and http(s) URLs.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseContainerRefError {
    #[error("container reference cannot be empty")]
    Empty,

    #[error("invalid whitespace in container reference: {0:?}")]
    Whitespace(String),
}

/// A container reference exactly as a workflow declared it.
///
/// Stored verbatim; the scheme is inspected lazily so the reference can be
/// echoed back in logs unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerRef {
    raw: String,
}

impl ContainerRef {
    pub fn parse(input: &str) -> Result<Self, ParseContainerRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseContainerRefError::Empty);
        }
        if input.chars().any(char::is_whitespace) {
            return Err(ParseContainerRefError::Whitespace(input.to_string()));
        }
        Ok(Self {
            raw: input.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Scheme before `://`, if any (`docker`, `oras`, `https`, ...).
    pub fn scheme(&self) -> Option<&str> {
        self.raw.split_once("://").map(|(scheme, _)| scheme)
    }

    /// Reference with any leading `scheme://` removed.
    pub fn without_scheme(&self) -> &str {
        self.raw
            .split_once("://")
            .map_or(self.raw.as_str(), |(_, rest)| rest)
    }

    /// True for plain file downloads served over HTTP(S).
    pub fn is_download(&self) -> bool {
        matches!(self.scheme(), Some("http") | Some("https"))
    }

    pub fn is_oras(&self) -> bool {
        self.scheme() == Some("oras")
    }

    /// Last `/`-separated component, used for short display names.
    pub fn last_segment(&self) -> &str {
        self.raw.rsplit('/').next().unwrap_or(&self.raw)
    }

    /// Address to hand to a registry pull, plus whether it is absolute.
    ///
    /// References with at most one `/` are resolved against `library`;
    /// anything longer already names its registry and is used as-is.
    pub fn pull_address(&self, library: &str) -> (String, bool) {
        if self.is_oras() {
            return (self.raw.clone(), true);
        }
        let path = self.without_scheme();
        if path.split('/').count() > 2 {
            (format!("docker://{}", path), true)
        } else {
            let library = library.trim_end_matches('/');
            (format!("docker://{}/{}", library, path), false)
        }
    }

    /// Name suitable for a one-line progress row.
    ///
    /// Seqera blob URLs end in `/data`, so the segment before it is used.
    pub fn nice_name(&self) -> String {
        let mut segments = self.raw.trim_end_matches('/').rsplit('/');
        let last = segments.next().unwrap_or(&self.raw);
        let name = if last == "data" {
            segments.next().unwrap_or(last)
        } else {
            last
        };
        name.chars().take(50).collect()
    }
}

impl FromStr for ContainerRef {
    type Err = ParseContainerRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
