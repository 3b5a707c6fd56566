// ABOUTME: Finds the container images a workflow tree references.
// ABOUTME: Uses the workflow inspector when it is new enough, the legacy scanner otherwise.

pub mod inspect;
pub mod legacy;
mod nf_config;

pub use nf_config::FlatConfig;

use crate::config::ContainerSystem;
use crate::diagnostics::Diagnostics;
use crate::types::ContainerRef;
use async_trait::async_trait;
use regex::Regex;
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tokio::process::Command;

/// Oldest inspector release whose JSON report lists process containers.
pub const MIN_INSPECT_VERSION: Version = Version::new(25, 4, 4);

static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"version\s+(\d+)\.(\d+)\.(\d+)").expect("valid version regex")
});

#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("'{path}' is not a workflow: '{missing}' is missing")]
    NotAWorkflow { path: PathBuf, missing: &'static str },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {stderr}", describe_exit(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse inspector output: {0}")]
    InspectOutput(#[source] serde_json::Error),

    #[error("cannot read workflow sources: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// The workflow engine's command-line surface used for discovery.
#[async_trait]
pub trait WorkflowInspector: Send + Sync {
    /// Installed version, or `None` when it cannot be determined.
    async fn version(&self) -> Option<Version>;

    /// Raw `config -flat` output for the tree.
    async fn config_flat(&self, tree: &Path) -> Result<String, DiscoverError>;

    /// Raw JSON `inspect` report for an entry script.
    async fn inspect(&self, entry: &Path, profile: Option<&str>) -> Result<String, DiscoverError>;
}

/// Parses the release out of `nextflow -version` output.
pub fn parse_version(output: &str) -> Option<Version> {
    let captures = VERSION_LINE.captures(output)?;
    let part = |i: usize| captures[i].parse::<u64>().ok();
    Some(Version::new(part(1)?, part(2)?, part(3)?))
}

/// Runs the `nextflow` executable found on `$PATH`.
#[derive(Debug, Clone)]
pub struct NextflowCli {
    program: String,
}

impl Default for NextflowCli {
    fn default() -> Self {
        Self {
            program: "nextflow".to_string(),
        }
    }
}

impl NextflowCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<String, DiscoverError> {
        let command = std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!(command, "running workflow inspector");

        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DiscoverError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(DiscoverError::CommandFailed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl WorkflowInspector for NextflowCli {
    async fn version(&self) -> Option<Version> {
        match self.run(&["-version".to_string()]).await {
            Ok(output) => parse_version(&output),
            Err(err) => {
                tracing::debug!("cannot determine workflow engine version: {err}");
                None
            }
        }
    }

    async fn config_flat(&self, tree: &Path) -> Result<String, DiscoverError> {
        self.run(&[
            "config".to_string(),
            "-flat".to_string(),
            tree.display().to_string(),
        ])
        .await
    }

    async fn inspect(&self, entry: &Path, profile: Option<&str>) -> Result<String, DiscoverError> {
        let mut args = vec!["inspect".to_string(), "-format".to_string(), "json".to_string()];
        if let Some(profile) = profile {
            args.push("-profile".to_string());
            args.push(profile.to_string());
        }
        args.push(entry.display().to_string());
        self.run(&args).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    Inspect,
    Legacy,
}

/// What discovery found in one workflow tree.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub containers: Vec<ContainerRef>,
    pub config: FlatConfig,
    pub method: DiscoveryMethod,
}

pub struct ImageDiscoverer {
    inspector: Arc<dyn WorkflowInspector>,
    system: ContainerSystem,
    force_legacy: bool,
    with_test_containers: bool,
}

impl ImageDiscoverer {
    pub fn new(inspector: Arc<dyn WorkflowInspector>, system: ContainerSystem) -> Self {
        Self {
            inspector,
            system,
            force_legacy: false,
            with_test_containers: true,
        }
    }

    /// Always use the regex scanner, even when the inspector is available.
    pub fn force_legacy(mut self, force: bool) -> Self {
        self.force_legacy = force;
        self
    }

    pub fn with_test_containers(mut self, include: bool) -> Self {
        self.with_test_containers = include;
        self
    }

    /// Loads the flat config for `tree`, falling back to main.nf params alone
    /// when the engine cannot resolve it.
    pub async fn load_config(&self, tree: &Path) -> FlatConfig {
        let mut config = match self.inspector.config_flat(tree).await {
            Ok(flat) => FlatConfig::parse(&flat),
            Err(err) => {
                tracing::warn!("cannot resolve workflow configuration: {err}");
                FlatConfig::default()
            }
        };
        config.scrape_main_nf(tree);
        config
    }

    pub async fn method(&self) -> DiscoveryMethod {
        if self.force_legacy {
            return DiscoveryMethod::Legacy;
        }
        match self.inspector.version().await {
            Some(version) if version >= MIN_INSPECT_VERSION => DiscoveryMethod::Inspect,
            Some(version) => {
                tracing::info!(
                    %version,
                    minimum = %MIN_INSPECT_VERSION,
                    "workflow engine too old for inspect, scanning sources instead"
                );
                DiscoveryMethod::Legacy
            }
            None => DiscoveryMethod::Legacy,
        }
    }

    pub async fn discover(
        &self,
        tree: &Path,
        diagnostics: &mut Diagnostics,
    ) -> Result<Discovery, DiscoverError> {
        for required in ["main.nf", "nextflow.config"] {
            if !tree.join(required).is_file() {
                return Err(DiscoverError::NotAWorkflow {
                    path: tree.to_path_buf(),
                    missing: required,
                });
            }
        }

        let config = self.load_config(tree).await;
        let method = self.method().await;
        let raw = match method {
            DiscoveryMethod::Inspect => {
                let profile = inspect::profile_for(self.system, self.with_test_containers);
                let report = self
                    .inspector
                    .inspect(&tree.join("main.nf"), profile.as_deref())
                    .await?;
                inspect::parse_report(&report)?
            }
            DiscoveryMethod::Legacy => legacy::scan(tree, &config, diagnostics)?,
        };

        let containers: Vec<ContainerRef> = raw
            .iter()
            .filter_map(|raw| ContainerRef::parse(raw).ok())
            .collect();
        tracing::debug!(count = containers.len(), ?method, "discovered containers");

        Ok(Discovery {
            containers,
            config,
            method,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_engine_version() {
        let output = "\n      N E X T F L O W\n      version 25.04.6 build 5954\n      created 01-07-2025 11:27 UTC\n";
        assert_eq!(parse_version(output), Some(Version::new(25, 4, 6)));
        assert_eq!(parse_version("no version here"), None);
    }

    #[test]
    fn inspect_gate() {
        assert!(Version::new(25, 4, 4) >= MIN_INSPECT_VERSION);
        assert!(Version::new(24, 10, 5) < MIN_INSPECT_VERSION);
        assert!(Version::new(25, 10, 0) >= MIN_INSPECT_VERSION);
    }
}
