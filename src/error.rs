// ABOUTME: Application-wide error types for stowage.
// ABOUTME: Uses thiserror for ergonomic error handling and maps errors to exit codes.

use crate::config::CacheUtilisation;
use crate::discover::DiscoverError;
use crate::download::DownloadError;
use crate::fetcher::PullError;
use crate::remote_index::IndexError;
use crate::tooling::ToolingError;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid combinations of user-supplied settings, raised before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("cache utilisation '{0}' is not supported for docker; use 'copy' or leave it unset")]
    DockerCachePolicy(CacheUtilisation),

    #[error(
        "cache utilisation '{0}' needs a cache directory; pass --cache-dir or set NXF_SINGULARITY_CACHEDIR"
    )]
    CacheDirRequired(CacheUtilisation),

    #[error("--cache-index requires cache utilisation 'remote'")]
    IndexWithoutRemote,

    #[error("cache utilisation 'remote' requires --cache-index")]
    RemoteWithoutIndex,

    #[error("parallel downloads must be at least 1")]
    InvalidParallel,

    #[error("pipeline '{0}' is not a local directory; only local workflow sources are supported")]
    UnsupportedPipelineSource(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Conditions that make a planned fetch impossible.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("output path is a directory: {0}")]
    TargetIsDirectory(PathBuf),

    #[error("output path is a symbolic link: {0}")]
    TargetIsSymlink(PathBuf),

    #[error("output directory already exists: {0} (use --force to overwrite)")]
    OutputDirExists(PathBuf),

    #[error("cannot stage {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Pull(#[from] PullError),

    #[error(transparent)]
    Tooling(#[from] ToolingError),

    #[error(transparent)]
    Discover(#[from] DiscoverError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("no container library left to try for {container}: {source}")]
    LibrariesExhausted {
        container: String,
        #[source]
        source: PullError,
    },

    #[error("interrupted")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Process exit status for this error.
    ///
    /// I/O failures exit with their OS error number when one is available.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Interrupted => 130,
            Error::Io(err) => err.raw_os_error().unwrap_or(1),
            Error::Plan(PlanError::Staging { source, .. }) => source.raw_os_error().unwrap_or(1),
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
