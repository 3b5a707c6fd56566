// ABOUTME: Configuration types and layering for stowage.yml, environment, and CLI flags.
// ABOUTME: Produces a validated ProvisionConfig before any work starts.

mod cache_utilisation;
mod container_system;
mod deserialize;

pub use cache_utilisation::{CacheUtilisation, LocationPolicy};
pub use container_system::ContainerSystem;

use crate::error::ConfigError;
use deserialize::deserialize_library_option;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "stowage.yml";
pub const CONFIG_FILENAME_ALT: &str = "stowage.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".stowage/config.yml";

pub const ENV_CACHE_DIR: &str = "NXF_SINGULARITY_CACHEDIR";
pub const ENV_LIBRARY_DIR: &str = "NXF_SINGULARITY_LIBRARYDIR";

pub const DEFAULT_LIBRARY: &str = "quay.io";
pub const DEFAULT_PARALLEL: usize = 4;

type Result<T> = std::result::Result<T, ConfigError>;

/// Settings read from a config file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub container_system: Option<ContainerSystem>,

    #[serde(default, deserialize_with = "deserialize_library_option")]
    pub container_library: Option<NonEmpty<String>>,

    #[serde(default)]
    pub cache_utilisation: Option<CacheUtilisation>,

    #[serde(default)]
    pub cache_index: Option<PathBuf>,

    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub library_dir: Option<PathBuf>,

    #[serde(default)]
    pub parallel: Option<usize>,

    #[serde(default, with = "humantime_serde")]
    pub download_timeout: Option<Duration>,

    /// Extra registries to trim from file names and alias with symlinks.
    #[serde(default)]
    pub registries: Vec<String>,
}

impl FileConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(ConfigError::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.to_path_buf()))?;
        Self::from_yaml(&content)
    }

    /// Loads the first config file found in `dir`, if any.
    pub fn discover(dir: &Path) -> Result<Option<Self>> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "using config file");
                return Self::load(path).map(Some);
            }
        }
        Ok(None)
    }
}

/// Values given on the command line. They win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub container_system: Option<ContainerSystem>,
    pub container_library: Vec<String>,
    pub cache_utilisation: Option<CacheUtilisation>,
    pub cache_index: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub library_dir: Option<PathBuf>,
    pub parallel: Option<usize>,
}

/// Fully resolved and validated settings for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    pub container_system: ContainerSystem,
    pub container_library: NonEmpty<String>,
    pub cache_utilisation: Option<CacheUtilisation>,
    pub cache_index: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub library_dir: Option<PathBuf>,
    pub parallel: usize,
    pub download_timeout: Duration,
    pub registries: Vec<String>,
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

impl ProvisionConfig {
    /// Layers defaults, `file`, environment and `overrides`, then validates.
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let container_system = overrides
            .container_system
            .or(file.container_system)
            .unwrap_or_default();

        let container_library = NonEmpty::from_vec(overrides.container_library)
            .or(file.container_library)
            .unwrap_or_else(|| NonEmpty::new(DEFAULT_LIBRARY.to_string()));

        let singularity = container_system == ContainerSystem::Singularity;
        let cache_dir = overrides
            .cache_dir
            .or(file.cache_dir)
            .or_else(|| singularity.then(|| env_path(ENV_CACHE_DIR)).flatten());
        let library_dir = overrides
            .library_dir
            .or(file.library_dir)
            .or_else(|| singularity.then(|| env_path(ENV_LIBRARY_DIR)).flatten())
            .filter(|dir| {
                let usable = dir.is_dir();
                if !usable {
                    tracing::warn!(
                        path = %dir.display(),
                        "library directory does not exist, ignoring it"
                    );
                }
                usable
            });

        let cache_index = overrides.cache_index.or(file.cache_index);
        let cache_utilisation = match (
            overrides.cache_utilisation.or(file.cache_utilisation),
            &cache_index,
        ) {
            (None | Some(CacheUtilisation::Remote), Some(_)) => Some(CacheUtilisation::Remote),
            (Some(CacheUtilisation::Remote), None) => return Err(ConfigError::RemoteWithoutIndex),
            (Some(_), Some(_)) => return Err(ConfigError::IndexWithoutRemote),
            (utilisation, None) => utilisation,
        };

        if container_system == ContainerSystem::Docker
            && let Some(utilisation) = cache_utilisation
            && utilisation != CacheUtilisation::Copy
        {
            return Err(ConfigError::DockerCachePolicy(utilisation));
        }

        if let Some(utilisation @ (CacheUtilisation::Amend | CacheUtilisation::Copy)) =
            cache_utilisation
            && cache_dir.is_none()
        {
            return Err(ConfigError::CacheDirRequired(utilisation));
        }

        let parallel = overrides
            .parallel
            .or(file.parallel)
            .unwrap_or(DEFAULT_PARALLEL);
        if parallel == 0 {
            return Err(ConfigError::InvalidParallel);
        }

        Ok(Self {
            container_system,
            container_library,
            cache_utilisation,
            cache_index,
            cache_dir,
            library_dir,
            parallel,
            download_timeout: file
                .download_timeout
                .unwrap_or(crate::download::DEFAULT_TIMEOUT),
            registries: file.registries,
        })
    }

    pub fn location_policy(&self) -> LocationPolicy {
        LocationPolicy::from(self.cache_utilisation)
    }

    /// Creates the cache directory when a policy writes into it.
    pub fn ensure_cache_dir(&self) -> std::io::Result<()> {
        match (&self.cache_dir, self.location_policy()) {
            (Some(dir), LocationPolicy::Amend | LocationPolicy::Copy) if !dir.exists() => {
                tracing::info!(path = %dir.display(), "creating cache directory");
                std::fs::create_dir_all(dir)
            }
            _ => Ok(()),
        }
    }
}
