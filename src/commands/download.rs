// ABOUTME: Download command implementation.
// ABOUTME: Copies each revision's working tree, discovers its images, and fetches them.

use crate::cli::DownloadArgs;
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stowage::abort::AbortSignal;
use stowage::config::{
    CacheUtilisation, ContainerSystem, FileConfig, LocationPolicy, Overrides, ProvisionConfig,
};
use stowage::diagnostics::Diagnostics;
use stowage::discover::{ImageDiscoverer, NextflowCli};
use stowage::error::Result;
use stowage::fetcher::{
    ContainerFetcher, DockerFetcher, FetchContext, Locations, ProcessRunner, SingularityFetcher,
    ToolRunner, fetch_containers,
};
use stowage::output::Output;
use stowage::progress::ContainerProgress;
use stowage::prompt::TerminalPrompter;
use stowage::registries::gather_registries;
use stowage::remote_index::resolve_remote_index;
use stowage::types::RegistrySet;
use stowage::workflow::{
    LocalWorkflowSource, WorkflowSource, default_output_dir, prepare_output_dir, revision_slug,
};

fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    match path {
        Some(path) => Ok(FileConfig::load(path)?),
        None => Ok(FileConfig::discover(&env::current_dir()?)?.unwrap_or_default()),
    }
}

fn overrides(args: &DownloadArgs) -> Overrides {
    Overrides {
        container_system: args.container_system,
        container_library: args.container_library.clone(),
        cache_utilisation: args.cache_utilisation,
        cache_index: args.cache_index.clone(),
        cache_dir: args.cache_dir.clone(),
        library_dir: args.library_dir.clone(),
        parallel: args.parallel,
    }
}

fn build_fetcher(config: &ProvisionConfig) -> Option<Box<dyn ContainerFetcher>> {
    let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner);
    match config.container_system {
        ContainerSystem::None => None,
        ContainerSystem::Singularity => Some(Box::new(SingularityFetcher::new(
            runner,
            config.container_library.clone(),
            config.parallel,
            config.download_timeout,
        ))),
        ContainerSystem::Docker => Some(Box::new(DockerFetcher::new(runner, config.parallel))),
    }
}

/// Reads the remote cache index, if one is configured.
///
/// An unusable index turns remote mode into `copy` when a cache directory is
/// available, otherwise into no cache use at all.
fn remote_exclusions(
    config: &mut ProvisionConfig,
    diagnostics: &mut Diagnostics,
) -> Result<BTreeSet<String>> {
    let Some(index) = config
        .cache_index
        .clone()
        .filter(|_| config.cache_utilisation == Some(CacheUtilisation::Remote))
    else {
        return Ok(BTreeSet::new());
    };

    if let Some(images) = resolve_remote_index(&index, &TerminalPrompter, diagnostics) {
        return Ok(images);
    }
    config.cache_index = None;
    config.cache_utilisation = config.cache_dir.as_ref().map(|_| CacheUtilisation::Copy);
    config.ensure_cache_dir()?;
    Ok(BTreeSet::new())
}

pub async fn download(args: DownloadArgs, progress: ContainerProgress, mut output: Output) -> Result<()> {
    output.start_timer();

    let file_config = load_file_config(args.config.as_deref())?;
    let mut config = ProvisionConfig::resolve(file_config, overrides(&args))?;

    let source = LocalWorkflowSource;
    let pipeline_name = source.pipeline_name(&args.pipeline);
    let revisions = if args.revisions.is_empty() {
        source.default_revisions(&args.pipeline)?
    } else {
        args.revisions.clone()
    };
    let outdir = args
        .outdir
        .clone()
        .unwrap_or_else(|| default_output_dir(&pipeline_name, &revisions, chrono::Local::now()));

    prepare_output_dir(&outdir, args.force)?;
    config.ensure_cache_dir()?;

    let mut diagnostics = Diagnostics::default();
    let exclude = remote_exclusions(&mut config, &mut diagnostics)?;

    let abort = AbortSignal::new();
    abort.watch_ctrl_c();

    output.progress(&format!(
        "Downloading {} ({} revision(s)) into {}, containers: {}",
        args.pipeline,
        revisions.len(),
        outdir.display(),
        config.container_system
    ));

    let mut fetcher = build_fetcher(&config);
    let images_dir = outdir.join(config.container_system.images_dir_name());
    let base_registries: RegistrySet = config
        .container_library
        .iter()
        .chain(config.registries.iter())
        .collect();
    let discoverer = ImageDiscoverer::new(Arc::new(NextflowCli::default()), config.container_system);
    let diagnostics = Arc::new(parking_lot::Mutex::new(diagnostics));

    for revision in &revisions {
        let slug = revision_slug(&pipeline_name, revision, &config.container_system.images_dir_name());
        let tree = outdir.join(&slug);
        source.materialise(&args.pipeline, revision, &tree).await?;
        output.progress(&format!("Revision {revision} written to {}", tree.display()));

        let Some(fetcher) = fetcher.as_deref_mut() else {
            continue;
        };

        let mut found = Diagnostics::default();
        let discovery = discoverer.discover(&tree, &mut found).await?;
        diagnostics.lock().merge(found);
        if discovery.containers.is_empty() {
            output.progress(&format!("No container images found for revision {revision}"));
            continue;
        }
        tracing::info!(
            revision,
            count = discovery.containers.len(),
            "processing container images"
        );

        std::fs::create_dir_all(&images_dir)?;
        let ctx = FetchContext {
            progress: progress.clone(),
            registries: gather_registries(&base_registries, &discovery.config, config.container_system),
            abort: abort.clone(),
            diagnostics: Arc::clone(&diagnostics),
        };
        let locations = Locations {
            output_dir: images_dir.clone(),
            library_dir: config.library_dir.clone(),
            cache_dir: config.cache_dir.clone(),
            policy: LocationPolicy::from(config.cache_utilisation),
        };

        let summary =
            fetch_containers(fetcher, &discovery.containers, &exclude, &locations, &ctx).await?;
        output.progress(&format!(
            "Revision {revision}: {} image(s), {} fetched, {} copied, {} skipped",
            summary.containers, summary.remote, summary.copied, summary.skipped
        ));
    }

    if let Some(fetcher) = fetcher.as_deref()
        && images_dir.is_dir()
        && let Some(message) = fetcher.cleanup(&images_dir).await?
    {
        output.info(&message);
    }

    output.diagnostics(&diagnostics.lock());
    output.success(&format!("Pipeline written to {}", display_path(&outdir)));
    Ok(())
}

fn display_path(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .display()
        .to_string()
}
