// ABOUTME: Container fetching: plan, remote pulls or downloads, then local copies.
// ABOUTME: Defines the ContainerFetcher trait implemented per container system.

mod docker;
mod plan;
mod pull_error;
mod singularity;
mod tool;

pub use docker::DockerFetcher;
pub use plan::{
    CopyJob, FetchPlan, Locations, PlanItem, PlannedContainer, RemoteJob, SkipReason,
    plan_fetches,
};
pub use pull_error::{PullError, PullErrorKind, PullFailure};
pub use singularity::{SingularityFetcher, symlink_registries};
pub use tool::{ProcessRunner, ToolCommand, ToolOutput, ToolRunner};

use crate::abort::AbortSignal;
use crate::canonical::ExtensionPolicy;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, Result};
use crate::intermediate::IntermediateFile;
use crate::progress::{ContainerProgress, MainTaskUpdate};
use crate::tooling::Implementation;
use crate::types::{ContainerRef, RegistrySet};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// State shared by every step of a fetch run.
#[derive(Clone)]
pub struct FetchContext {
    pub progress: ContainerProgress,
    pub registries: RegistrySet,
    pub abort: AbortSignal,
    pub diagnostics: Arc<Mutex<Diagnostics>>,
}

impl FetchContext {
    pub fn new(progress: ContainerProgress, registries: RegistrySet, abort: AbortSignal) -> Self {
        Self {
            progress,
            registries,
            abort,
            diagnostics: Arc::new(Mutex::new(Diagnostics::default())),
        }
    }

    pub fn advance_main(&self) {
        self.progress.update_main_task(MainTaskUpdate::advance(1));
    }
}

/// Counts reported after a fetch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub containers: usize,
    pub skipped: usize,
    pub remote: usize,
    pub copied: usize,
}

#[async_trait]
pub trait ContainerFetcher: Send + Sync {
    /// File extension family for artefacts this fetcher produces.
    fn extension_policy(&self) -> ExtensionPolicy;

    /// Resolves the tool to run, detecting it on first use.
    fn check_and_set_implementation(&mut self) -> Result<Implementation>;

    fn construct_pull_command(&self, address: &str, output: &Path) -> ToolCommand;

    /// Fetches every job into its target, advancing the summary row once per job.
    async fn fetch_remote_containers(
        &mut self,
        jobs: Vec<RemoteJob>,
        ctx: &FetchContext,
    ) -> Result<()>;

    /// Returns whether a file was written.
    async fn copy_image(&self, job: &CopyJob, ctx: &FetchContext) -> Result<bool> {
        copy_image_file(job, ctx).await
    }

    /// Post-run housekeeping in the images directory. Returns a message for the user.
    async fn cleanup(&self, _images_dir: &Path) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Copies `job.src` to `job.dest` through a staging file.
///
/// A missing source is reported and skipped rather than failing the run.
/// Returns whether a file was written.
pub async fn copy_image_file(job: &CopyJob, ctx: &FetchContext) -> Result<bool> {
    if !job.src.exists() {
        let message = format!(
            "image {} does not exist at {}, cannot copy it to {}",
            job.reference,
            job.src.display(),
            job.dest.display()
        );
        tracing::error!("{message}");
        ctx.diagnostics
            .lock()
            .record(Warning::copy_source_missing(message));
        return Ok(false);
    }
    if job.dest.exists() {
        tracing::debug!(dest = %job.dest.display(), "copy target already present");
        return Ok(false);
    }

    tracing::debug!(src = %job.src.display(), dest = %job.dest.display(), "copying image");
    let staged = IntermediateFile::create(&job.dest)?;
    tokio::fs::copy(&job.src, staged.path()).await?;
    staged.commit()?;
    Ok(true)
}

/// Plans and runs the fetch of `refs` into `locations.output_dir`.
///
/// Skips advance the summary row immediately. All remote fetches run before
/// any copy so that cache-to-output copies find the freshly fetched file.
pub async fn fetch_containers<F>(
    fetcher: &mut F,
    refs: &[ContainerRef],
    remote_exclude: &BTreeSet<String>,
    locations: &Locations,
    ctx: &FetchContext,
) -> Result<FetchSummary>
where
    F: ContainerFetcher + ?Sized,
{
    let plan = plan_fetches(
        refs,
        &ctx.registries,
        fetcher.extension_policy(),
        remote_exclude,
        locations,
    );

    ctx.progress
        .add_main_task(plan.task_total(), "Processing container images");
    let skipped = plan.skipped();
    if skipped > 0 {
        tracing::info!(skipped, "containers already present, skipping");
        ctx.progress
            .update_main_task(MainTaskUpdate::advance(skipped as u64));
    }

    let outcome = execute_plan(fetcher, &plan, ctx).await;
    ctx.progress.remove_main_task();
    let (remote, copied) = outcome?;

    Ok(FetchSummary {
        containers: plan.containers.len(),
        skipped,
        remote,
        copied,
    })
}

async fn execute_plan<F>(fetcher: &mut F, plan: &FetchPlan, ctx: &FetchContext) -> Result<(usize, usize)>
where
    F: ContainerFetcher + ?Sized,
{
    let remote = plan.remote_jobs();
    let remote_count = remote.len();
    if !remote.is_empty() {
        fetcher.fetch_remote_containers(remote, ctx).await?;
    }

    let mut copied = 0;
    for job in plan.copy_jobs() {
        if ctx.abort.is_triggered() {
            return Err(Error::Interrupted);
        }
        if fetcher.copy_image(&job, ctx).await? {
            copied += 1;
        }
        ctx.advance_main();
    }
    Ok((remote_count, copied))
}
