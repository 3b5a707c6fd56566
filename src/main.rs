// ABOUTME: Entry point for the stowage CLI application.
// ABOUTME: Parses arguments, sets up logging, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::io::IsTerminal;
use stowage::error::Result;
use stowage::output::{Output, OutputMode};
use stowage::progress::ContainerProgress;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    let hide_requested = match &cli.command {
        Commands::Download(args) => args.hide_progress,
        Commands::Images(_) => true,
    };
    let progress = ContainerProgress::new(
        hide_requested || mode != OutputMode::Normal || !std::io::stderr().is_terminal(),
    );

    // RUST_LOG wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .with_writer(progress.clone())
        .init();

    if let Err(e) = run(cli, progress, mode).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, progress: ContainerProgress, mode: OutputMode) -> Result<()> {
    let output = Output::new(mode);
    match cli.command {
        Commands::Download(args) => commands::download(args, progress, output).await,
        Commands::Images(args) => commands::images(args, output).await,
    }
}
