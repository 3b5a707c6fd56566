// ABOUTME: Docker fetcher: pulls each image and saves it as a tar archive.
// ABOUTME: Jobs run concurrently; load scripts for the offline host are written on cleanup.

use super::plan::RemoteJob;
use super::pull_error::{PullError, PullFailure};
use super::tool::{ToolCommand, ToolOutput, ToolRunner};
use super::{ContainerFetcher, FetchContext};
use crate::canonical::ExtensionPolicy;
use crate::diagnostics::Warning;
use crate::error::{Error, Result};
use crate::intermediate::IntermediateDir;
use crate::progress::TaskKind;
use crate::tooling::{self, Implementation};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const LOAD_SCRIPT: &str = r#"#!/usr/bin/env bash
# Load every image archive in this directory into the local daemon.
set -euo pipefail
cd "$(dirname "$0")"
for archive in *.tar; do
    [ -e "$archive" ] || continue
    echo "Loading $archive"
    __TOOL__ image load --input "$archive"
done
"#;

pub struct DockerFetcher {
    runner: Arc<dyn ToolRunner>,
    implementation: Option<Implementation>,
    parallel: usize,
}

impl DockerFetcher {
    pub fn new(runner: Arc<dyn ToolRunner>, parallel: usize) -> Self {
        Self {
            runner,
            implementation: None,
            parallel,
        }
    }

    pub fn with_implementation(mut self, implementation: Implementation) -> Self {
        self.implementation = Some(implementation);
        self
    }

    fn program(&self) -> &'static str {
        self.implementation
            .unwrap_or(Implementation::Docker)
            .program()
    }

    pub fn construct_save_command(&self, address: &str, output: &Path) -> ToolCommand {
        save_command(self.program(), address, output)
    }
}

fn save_command(program: &str, address: &str, output: &Path) -> ToolCommand {
    ToolCommand::new(program)
        .arg("image")
        .arg("save")
        .arg(address)
        .arg("--output")
        .arg(output.to_string_lossy())
}

/// Docker reports most failures on stderr while still exiting non-zero.
fn failed(output: &ToolOutput) -> bool {
    !output.success
        || output.contains("invalid reference format")
        || output.contains("Error response from daemon:")
}

struct PullSave {
    runner: Arc<dyn ToolRunner>,
    program: &'static str,
    pull: ToolCommand,
    address: String,
}

impl PullSave {
    fn failure(&self, job: &RemoteJob, command: ToolCommand, output: ToolOutput) -> Error {
        PullError::classify(PullFailure {
            container: job.reference.to_string(),
            library: None,
            address: self.address.clone(),
            absolute: true,
            command,
            output: output.lines,
        })
        .into()
    }

    async fn run(&self, job: &RemoteJob, ctx: &FetchContext) -> Result<()> {
        let task = ctx
            .progress
            .add_task(&job.reference.nice_name(), TaskKind::Docker, Some(2));

        task.set_message("Pulling");
        let output = self.runner.run(&self.pull, &|_| {}).await?;
        if failed(&output) {
            return Err(self.failure(job, self.pull.clone(), output));
        }
        task.advance(1);

        task.set_message("Saving");
        let staged = IntermediateDir::create(&job.target)?;
        let save = save_command(self.program, &self.address, staged.path());
        let output = self.runner.run(&save, &|_| {}).await?;
        if failed(&output) || !staged.is_populated() {
            return Err(self.failure(job, save, output));
        }
        staged.commit()?;
        task.advance(1);
        Ok(())
    }
}

#[async_trait]
impl ContainerFetcher for DockerFetcher {
    fn extension_policy(&self) -> ExtensionPolicy {
        ExtensionPolicy::Docker
    }

    fn check_and_set_implementation(&mut self) -> Result<Implementation> {
        if let Some(implementation) = self.implementation {
            return Ok(implementation);
        }
        let implementation = tooling::detect_docker()?;
        self.implementation = Some(implementation);
        Ok(implementation)
    }

    fn construct_pull_command(&self, address: &str, _output: &Path) -> ToolCommand {
        ToolCommand::new(self.program())
            .arg("image")
            .arg("pull")
            .arg(address)
    }

    async fn fetch_remote_containers(
        &mut self,
        jobs: Vec<RemoteJob>,
        ctx: &FetchContext,
    ) -> Result<()> {
        self.check_and_set_implementation()?;

        let permits = Arc::new(Semaphore::new(self.parallel.max(1)));
        let mut set = JoinSet::new();
        for job in jobs {
            let address = job.reference.without_scheme().to_string();
            let worker = PullSave {
                runner: Arc::clone(&self.runner),
                program: self.program(),
                pull: self.construct_pull_command(&address, &job.target),
                address,
            };
            let permits = Arc::clone(&permits);
            let ctx = ctx.clone();
            set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                if ctx.abort.is_triggered() {
                    return (job, Err(Error::Interrupted));
                }
                let result = worker.run(&job, &ctx).await;
                (job, result)
            });
        }

        let mut fatal = None;
        while let Some(joined) = set.join_next().await {
            ctx.advance_main();
            let (job, result) = match joined {
                Ok(done) => done,
                Err(err) => {
                    tracing::error!("docker worker failed: {err}");
                    continue;
                }
            };
            match result {
                Ok(()) => tracing::debug!(container = %job.reference, "saved image"),
                Err(Error::Interrupted) => {}
                Err(Error::Pull(err)) => {
                    let message = format!("{err}\n{}", err.help());
                    tracing::error!("{message}");
                    ctx.diagnostics.lock().record(Warning::pull_failed(message));
                }
                Err(other) => {
                    tracing::error!(container = %job.reference, "{other}");
                    fatal.get_or_insert(other);
                }
            }
        }

        if ctx.abort.is_triggered() {
            return Err(Error::Interrupted);
        }
        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn cleanup(&self, images_dir: &Path) -> Result<Option<String>> {
        let mut scripts = Vec::new();
        for tool in ["docker", "podman"] {
            let name = format!("{tool}-load.sh");
            let path = images_dir.join(&name);
            tokio::fs::write(&path, LOAD_SCRIPT.replace("__TOOL__", tool)).await?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o775)).await?;
            }
            scripts.push(name);
        }

        Ok(Some(format!(
            "Downloaded docker images written to '{dir}'.\n\
             After copying the pipeline and images to the offline machine, run\n\n    \
             ./{docker} (or ./{podman} (experimental))\n\n\
             inside '{dir}' to load the images into the offline Docker (Podman) daemon.",
            dir = images_dir.display(),
            docker = scripts[0],
            podman = scripts[1],
        )))
    }
}
