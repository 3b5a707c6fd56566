// ABOUTME: Target container system for the offline copy.
// ABOUTME: none, singularity (also covers apptainer), or docker.

use serde::de::{self, Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerSystem {
    #[default]
    None,
    Singularity,
    Docker,
}

impl ContainerSystem {
    /// Name of the per-system images directory inside the output directory.
    pub fn images_dir_name(self) -> String {
        format!("{self}-images")
    }
}

impl FromStr for ContainerSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ContainerSystem::None),
            "singularity" | "apptainer" => Ok(ContainerSystem::Singularity),
            "docker" => Ok(ContainerSystem::Docker),
            _ => Err(format!("unknown container system: {}", s)),
        }
    }
}

impl fmt::Display for ContainerSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerSystem::None => write!(f, "none"),
            ContainerSystem::Singularity => write!(f, "singularity"),
            ContainerSystem::Docker => write!(f, "docker"),
        }
    }
}

impl<'de> Deserialize<'de> for ContainerSystem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
