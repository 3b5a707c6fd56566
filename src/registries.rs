// ABOUTME: Builds the registry set trimmed from artefact names and used for symlink aliases.
// ABOUTME: Combines container libraries, configured registries, and well-known defaults.

use crate::config::ContainerSystem;
use crate::discover::FlatConfig;
use crate::types::RegistrySet;

pub const GALAXY_SINGULARITY: &str = "depot.galaxyproject.org/singularity";
pub const SEQERA_DOCKER: &str = "community.wave.seqera.io/library";
pub const SEQERA_SINGULARITY: &str = "community-cr-prod.seqera.io/docker/registry/v2";

const SINGULARITY_KEYS: [&str; 4] = [
    "apptainer.registry",
    "docker.registry",
    "podman.registry",
    "singularity.registry",
];

const DOCKER_KEYS: [&str; 2] = ["docker.registry", "podman.registry"];

/// Registries named by the workflow configuration under `keys`.
pub fn config_registries(config: &FlatConfig, keys: &[&str]) -> RegistrySet {
    keys.iter()
        .filter_map(|key| config.get(key))
        .filter(|value| *value != "null")
        .collect()
}

/// Extends `base` with the registries relevant to `system`.
pub fn gather_registries(
    base: &RegistrySet,
    config: &FlatConfig,
    system: ContainerSystem,
) -> RegistrySet {
    let mut registries = base.clone();
    match system {
        ContainerSystem::Singularity => {
            registries.extend(config_registries(config, &SINGULARITY_KEYS).iter());
            registries.extend([GALAXY_SINGULARITY, SEQERA_DOCKER, SEQERA_SINGULARITY]);
        }
        ContainerSystem::Docker => {
            registries.extend(config_registries(config, &DOCKER_KEYS).iter());
            registries.extend([SEQERA_DOCKER]);
        }
        ContainerSystem::None => {}
    }
    tracing::debug!(registries = ?registries, "gathered registries");
    registries
}
