// ABOUTME: Singularity/Apptainer fetcher: HTTP downloads plus registry pulls.
// ABOUTME: Falls back through the container libraries and links registry aliases.

use super::plan::{CopyJob, RemoteJob};
use super::pull_error::{PullError, PullErrorKind, PullFailure};
use super::tool::{ToolCommand, ToolRunner};
use super::{ContainerFetcher, FetchContext, copy_image_file};
use crate::canonical::{ExtensionPolicy, registry_aliases};
use crate::diagnostics::{Diagnostics, Warning};
use crate::download::{DownloadJob, DownloadStatus, FileDownloader};
use crate::error::{Error, Result};
use crate::intermediate::IntermediateDir;
use crate::progress::TaskKind;
use crate::tooling::{self, Implementation};
use crate::types::{ArtefactName, RegistrySet};
use async_trait::async_trait;
use nonempty::NonEmpty;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Creates `<registry>-<name>` symlinks next to `image` for every known registry.
///
/// Links point at the bare file name so the directory stays relocatable.
/// Existing entries are left untouched; failures are recorded, never fatal.
pub fn symlink_registries(
    image: &Path,
    registries: &RegistrySet,
    diagnostics: &Mutex<Diagnostics>,
) {
    let (Some(dir), Some(file_name)) = (image.parent(), image.file_name()) else {
        return;
    };
    let Ok(name) = ArtefactName::new(&file_name.to_string_lossy()) else {
        return;
    };

    for alias in registry_aliases(&name, registries) {
        let link = dir.join(&alias);
        if std::fs::symlink_metadata(&link).is_ok() {
            continue;
        }
        tracing::debug!(link = %link.display(), image = %name, "linking registry alias");
        if let Err(err) = make_symlink(name.as_str(), &link) {
            diagnostics.lock().warn(Warning::symlink_failed(format!(
                "cannot link {} to {}: {}",
                link.display(),
                name,
                err
            )));
        }
    }
}

#[cfg(unix)]
fn make_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(_target: &str, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::other("symbolic links are not supported on this platform"))
}

pub struct SingularityFetcher {
    runner: Arc<dyn ToolRunner>,
    implementation: Option<Implementation>,
    container_library: Vec<String>,
    parallel: usize,
    download_timeout: Duration,
}

impl SingularityFetcher {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        container_library: NonEmpty<String>,
        parallel: usize,
        download_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            implementation: None,
            container_library: container_library.into_iter().collect(),
            parallel,
            download_timeout,
        }
    }

    /// Skips `$PATH` detection and always runs `implementation`.
    pub fn with_implementation(mut self, implementation: Implementation) -> Self {
        self.implementation = Some(implementation);
        self
    }

    /// Libraries still considered reachable, in fallback order.
    pub fn container_library(&self) -> &[String] {
        &self.container_library
    }

    async fn download_images(&self, jobs: Vec<RemoteJob>, ctx: &FetchContext) -> Result<()> {
        let downloader =
            FileDownloader::new(ctx.progress.clone(), ctx.abort.clone(), self.download_timeout)?
                .with_file_mode(0o755);
        let jobs = jobs
            .into_iter()
            .map(|job| DownloadJob {
                url: job.reference.to_string(),
                dest: job.target,
            })
            .collect();

        downloader
            .download_files_in_parallel(jobs, self.parallel, |job, status| {
                ctx.advance_main();
                if status == DownloadStatus::Done {
                    symlink_registries(&job.dest, &ctx.registries, &ctx.diagnostics);
                }
            })
            .await?;
        Ok(())
    }

    async fn pull_images(&mut self, jobs: Vec<RemoteJob>, ctx: &FetchContext) -> Result<()> {
        let implementation = self.check_and_set_implementation()?;
        tracing::debug!(tool = %implementation, count = jobs.len(), "pulling images");

        for job in jobs {
            if ctx.abort.is_triggered() {
                return Err(Error::Interrupted);
            }
            let outcome = self.pull_with_fallback(&job, ctx).await;
            ctx.advance_main();
            outcome?;
        }
        Ok(())
    }

    /// Tries each library in turn until one pull succeeds.
    async fn pull_with_fallback(&mut self, job: &RemoteJob, ctx: &FetchContext) -> Result<()> {
        let candidates = self.container_library.clone();
        let mut last_error = None;

        for library in candidates {
            let err = match self.pull_image(job, &library, ctx).await {
                Ok(()) => return Ok(()),
                Err(Error::Pull(err)) => err,
                Err(other) => return Err(other),
            };
            tracing::debug!(container = %job.reference, library, kind = ?err.kind(), "pull failed");

            match err.kind() {
                PullErrorKind::ImageExists => return Ok(()),
                PullErrorKind::RegistryNotFound => {
                    tracing::error!("{err}\n{}", err.help());
                    self.container_library.retain(|candidate| candidate != &library);
                    if self.container_library.is_empty() {
                        return Err(Error::LibrariesExhausted {
                            container: job.reference.to_string(),
                            source: err,
                        });
                    }
                    last_error = Some(err);
                }
                PullErrorKind::ImageNotFound | PullErrorKind::InvalidTag | PullErrorKind::Other => {
                    let absolute = err.failure().absolute;
                    last_error = Some(err);
                    if absolute {
                        break;
                    }
                }
                PullErrorKind::NoSingularityContainer => {
                    last_error = Some(err);
                    break;
                }
            }
        }

        let mut message = format!(
            "Not able to pull image of {}. Service might be down or internet connection is dead.",
            job.reference
        );
        if let Some(err) = last_error {
            message.push_str(&format!("\n{err}\n{}", err.help()));
        }
        tracing::error!("{message}");
        ctx.diagnostics.lock().record(Warning::pull_failed(message));
        Ok(())
    }

    async fn pull_image(&self, job: &RemoteJob, library: &str, ctx: &FetchContext) -> Result<()> {
        if job.target.exists() {
            tracing::debug!(path = %job.target.display(), "image already present, not pulling");
            return Ok(());
        }

        let (address, absolute) = job.reference.pull_address(library);
        let staged = IntermediateDir::create(&job.target)?;
        let command = self.construct_pull_command(&address, staged.path());
        let task = ctx
            .progress
            .add_task(job.reference.as_str(), TaskKind::SingularityPull, None);
        tracing::debug!(command = %command, "pulling image");

        let output = self
            .runner
            .run(&command, &|line| task.set_message(line))
            .await?;

        let fatal = output.lines.iter().any(|line| line.contains("FATAL: "));
        if fatal || !output.success || !staged.is_populated() {
            return Err(PullError::classify(PullFailure {
                container: job.reference.to_string(),
                library: Some(library.to_string()),
                address,
                absolute,
                command,
                output: output.lines,
            })
            .into());
        }

        staged.commit()?;
        symlink_registries(&job.target, &ctx.registries, &ctx.diagnostics);
        Ok(())
    }
}

#[async_trait]
impl ContainerFetcher for SingularityFetcher {
    fn extension_policy(&self) -> ExtensionPolicy {
        ExtensionPolicy::Singularity
    }

    fn check_and_set_implementation(&mut self) -> Result<Implementation> {
        if let Some(implementation) = self.implementation {
            return Ok(implementation);
        }
        let implementation = tooling::detect_singularity()?;
        self.implementation = Some(implementation);
        Ok(implementation)
    }

    fn construct_pull_command(&self, address: &str, output: &Path) -> ToolCommand {
        let program = self
            .implementation
            .unwrap_or(Implementation::Singularity)
            .program();
        ToolCommand::new(program)
            .arg("pull")
            .arg("--name")
            .arg(output.to_string_lossy())
            .arg(address)
    }

    async fn fetch_remote_containers(
        &mut self,
        jobs: Vec<RemoteJob>,
        ctx: &FetchContext,
    ) -> Result<()> {
        let (downloads, pulls): (Vec<_>, Vec<_>) =
            jobs.into_iter().partition(|job| job.reference.is_download());

        let downloaded = if downloads.is_empty() {
            Ok(())
        } else {
            self.download_images(downloads, ctx).await
        };
        if matches!(downloaded, Err(Error::Interrupted)) {
            return downloaded;
        }

        // A failed download batch is reported only after every pull has run.
        if !pulls.is_empty() {
            self.pull_images(pulls, ctx).await?;
        }
        downloaded
    }

    async fn copy_image(&self, job: &CopyJob, ctx: &FetchContext) -> Result<bool> {
        let written = copy_image_file(job, ctx).await?;
        if written {
            symlink_registries(&job.dest, &ctx.registries, &ctx.diagnostics);
        }
        Ok(written)
    }
}
