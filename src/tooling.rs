// ABOUTME: Locates container tools on $PATH.
// ABOUTME: Checks singularity before apptainer, and docker for archive exports.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ToolingError {
    #[error("{tools} is needed to {purpose}, but it is not installed or not in $PATH")]
    Missing { tools: String, purpose: &'static str },
}

/// Container tool used to pull and save images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Implementation {
    Singularity,
    Apptainer,
    Docker,
}

impl Implementation {
    pub fn program(self) -> &'static str {
        match self {
            Implementation::Singularity => "singularity",
            Implementation::Apptainer => "apptainer",
            Implementation::Docker => "docker",
        }
    }
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Finds `program` in the directories listed by `search_path`.
pub fn find_in(program: &str, search_path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

/// Finds `program` on the current `$PATH`.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let search_path = std::env::var_os("PATH")?;
    find_in(program, &search_path)
}

/// Detect a Singularity-compatible tool.
///
/// Detection order:
/// 1. `singularity`
/// 2. `apptainer`
pub fn detect_singularity() -> Result<Implementation, ToolingError> {
    detect(
        &[Implementation::Singularity, Implementation::Apptainer],
        "pull Singularity images",
    )
}

pub fn detect_docker() -> Result<Implementation, ToolingError> {
    detect(&[Implementation::Docker], "pull and save Docker images")
}

fn detect(
    candidates: &[Implementation],
    purpose: &'static str,
) -> Result<Implementation, ToolingError> {
    for candidate in candidates {
        if let Some(path) = find_executable(candidate.program()) {
            tracing::debug!(tool = %candidate, path = %path.display(), "found container tool");
            return Ok(*candidate);
        }
    }
    Err(ToolingError::Missing {
        tools: candidates
            .iter()
            .map(|c| c.program())
            .collect::<Vec<_>>()
            .join(" or "),
        purpose,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn fake_tool(dir: &Path, name: &str, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn finds_executable_in_later_path_entry() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fake_tool(second.path(), "apptainer", 0o755);

        let search = std::env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(
            find_in("apptainer", &search),
            Some(second.path().join("apptainer"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn ignores_non_executable_files() {
        let dir = TempDir::new().unwrap();
        fake_tool(dir.path(), "singularity", 0o644);

        let search = std::env::join_paths([dir.path()]).unwrap();
        assert_eq!(find_in("singularity", &search), None);
    }

    #[test]
    fn missing_error_names_all_candidates() {
        let err = ToolingError::Missing {
            tools: "singularity or apptainer".to_string(),
            purpose: "pull Singularity images",
        };
        assert!(err.to_string().starts_with("singularity or apptainer is needed"));
    }
}
