// ABOUTME: Validated domain types shared across the crate.
// ABOUTME: Container references, canonical artefact names and registry sets.

mod artefact_name;
mod container_ref;
mod registry_set;

pub use artefact_name::{ArtefactName, ArtefactNameError};
pub use container_ref::{ContainerRef, ParseContainerRefError};
pub use registry_set::RegistrySet;
