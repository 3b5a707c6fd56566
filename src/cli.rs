// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use stowage::config::{CacheUtilisation, ContainerSystem};

#[derive(Parser)]
#[command(name = "stowage")]
#[command(about = "Provision the container images of a workflow pipeline for offline use")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result and problems
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Copy a pipeline and every container image it uses into an output directory
    Download(DownloadArgs),

    /// List the container images a workflow tree references
    Images(ImagesArgs),
}

#[derive(Args)]
pub struct DownloadArgs {
    /// Workflow directory, or an owner/name pipeline identifier
    pub pipeline: String,

    /// Revision to download (repeatable)
    #[arg(short, long = "revision")]
    pub revisions: Vec<String>,

    /// Output directory; must not exist unless --force is given
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Container system to provision images for
    #[arg(short = 's', long)]
    pub container_system: Option<ContainerSystem>,

    /// Registry to try when pulling relative references (repeatable, in order)
    #[arg(short = 'l', long = "container-library")]
    pub container_library: Vec<String>,

    /// How to use the shared image cache
    #[arg(long = "cache-utilisation")]
    pub cache_utilisation: Option<CacheUtilisation>,

    /// Index of images already present in the remote cache
    #[arg(long)]
    pub cache_index: Option<PathBuf>,

    /// Shared image cache directory [default: $NXF_SINGULARITY_CACHEDIR for singularity]
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Read-only library of pre-staged images [default: $NXF_SINGULARITY_LIBRARYDIR for singularity]
    #[arg(long)]
    pub library_dir: Option<PathBuf>,

    /// Number of parallel downloads
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Replace an existing output directory
    #[arg(short, long)]
    pub force: bool,

    /// Do not draw progress bars
    #[arg(long)]
    pub hide_progress: bool,

    /// Configuration file (defaults to stowage.yml in the current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImagesArgs {
    /// Workflow directory to scan
    pub workflow_dir: PathBuf,

    /// Container system whose file names are shown
    #[arg(short = 's', long, default_value = "singularity")]
    pub container_system: ContainerSystem,

    /// Registry to trim from file names (repeatable) [default: quay.io]
    #[arg(short = 'l', long = "container-library")]
    pub container_library: Vec<String>,

    /// Scan sources with regular expressions instead of running the inspector
    #[arg(long)]
    pub legacy: bool,
}
