// ABOUTME: Container discovery through the workflow inspector's JSON report.
// ABOUTME: Collects the unique container string of every process.

use super::DiscoverError;
use crate::config::ContainerSystem;
use serde::Deserialize;
use std::collections::BTreeSet;

#[derive(Debug, Deserialize)]
struct InspectReport {
    processes: Vec<InspectProcess>,
}

#[derive(Debug, Deserialize)]
struct InspectProcess {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    container: Option<String>,
}

/// Profile argument for the inspector, including test profiles so their
/// containers are provisioned as well.
pub fn profile_for(system: ContainerSystem, with_test_containers: bool) -> Option<String> {
    if system == ContainerSystem::None {
        return None;
    }
    let mut profile = system.to_string();
    if with_test_containers {
        profile.push_str(",test,test_full");
    }
    Some(profile)
}

/// Extracts the sorted, de-duplicated container strings from an inspector report.
pub fn parse_report(json: &str) -> Result<Vec<String>, DiscoverError> {
    let report: InspectReport =
        serde_json::from_str(json).map_err(DiscoverError::InspectOutput)?;

    let mut containers = BTreeSet::new();
    for process in report.processes {
        match process.container.map(|c| c.trim().to_string()) {
            Some(container) if !container.is_empty() => {
                containers.insert(container);
            }
            _ => tracing::debug!(
                process = process.name.as_deref().unwrap_or("<unnamed>"),
                "process declares no container"
            ),
        }
    }
    Ok(containers.into_iter().collect())
}
