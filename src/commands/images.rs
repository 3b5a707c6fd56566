// ABOUTME: Images command implementation.
// ABOUTME: Lists discovered container references with the file names they would be stored as.

use crate::cli::ImagesArgs;
use std::sync::Arc;
use stowage::canonical::{ExtensionPolicy, canonicalise};
use stowage::config::{ContainerSystem, DEFAULT_LIBRARY};
use stowage::diagnostics::Diagnostics;
use stowage::discover::{ImageDiscoverer, NextflowCli};
use stowage::error::Result;
use stowage::output::Output;
use stowage::registries::gather_registries;
use stowage::types::RegistrySet;

pub async fn images(args: ImagesArgs, output: Output) -> Result<()> {
    let discoverer = ImageDiscoverer::new(Arc::new(NextflowCli::default()), args.container_system)
        .force_legacy(args.legacy);
    let mut diagnostics = Diagnostics::default();
    let discovery = discoverer.discover(&args.workflow_dir, &mut diagnostics).await?;

    let base: RegistrySet = if args.container_library.is_empty() {
        [DEFAULT_LIBRARY].into_iter().collect()
    } else {
        args.container_library.iter().collect()
    };
    let registries = gather_registries(&base, &discovery.config, args.container_system);
    let extensions = match args.container_system {
        ContainerSystem::Docker => ExtensionPolicy::Docker,
        ContainerSystem::Singularity | ContainerSystem::None => ExtensionPolicy::Singularity,
    };

    for reference in &discovery.containers {
        let name = canonicalise(reference.as_str(), &registries, extensions);
        output.image(reference.as_str(), name.as_str());
    }

    output.diagnostics(&diagnostics);
    output.progress(&format!(
        "{} image(s) found ({:?} discovery)",
        discovery.containers.len(),
        discovery.method
    ));
    Ok(())
}
