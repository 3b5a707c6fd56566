// ABOUTME: Cache utilisation modes and the location policy derived from them.
// ABOUTME: Supports amend, copy, and remote (read-only index of a remote cache).

use serde::de::{self, Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// How the shared image cache participates in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUtilisation {
    /// Fetch into the cache only; the output gets no copy.
    Amend,
    /// Fetch into the cache and copy each image to the output.
    Copy,
    /// Skip images listed in a remote cache index.
    Remote,
}

impl FromStr for CacheUtilisation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amend" => Ok(CacheUtilisation::Amend),
            "copy" => Ok(CacheUtilisation::Copy),
            "remote" => Ok(CacheUtilisation::Remote),
            _ => Err(format!("unknown cache utilisation: {}", s)),
        }
    }
}

impl fmt::Display for CacheUtilisation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheUtilisation::Amend => write!(f, "amend"),
            CacheUtilisation::Copy => write!(f, "copy"),
            CacheUtilisation::Remote => write!(f, "remote"),
        }
    }
}

impl<'de> Deserialize<'de> for CacheUtilisation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Where fetched images are written, once the cache mode is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocationPolicy {
    /// Write straight into the output directory.
    #[default]
    None,
    /// Use the cache as the primary destination.
    Amend,
    /// Write into the cache, then mirror into the output directory.
    Copy,
}

impl From<Option<CacheUtilisation>> for LocationPolicy {
    fn from(utilisation: Option<CacheUtilisation>) -> Self {
        match utilisation {
            Some(CacheUtilisation::Amend) => LocationPolicy::Amend,
            Some(CacheUtilisation::Copy) => LocationPolicy::Copy,
            Some(CacheUtilisation::Remote) | None => LocationPolicy::None,
        }
    }
}
