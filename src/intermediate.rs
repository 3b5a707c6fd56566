// ABOUTME: Staging guards that publish a file atomically or not at all.
// ABOUTME: Writers target a temporary sibling which is renamed into place on commit.

use crate::error::PlanError;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, TempPath};

fn check_target(target: &Path) -> Result<(), PlanError> {
    if target.is_dir() {
        return Err(PlanError::TargetIsDirectory(target.to_path_buf()));
    }
    let is_symlink = std::fs::symlink_metadata(target)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    if is_symlink {
        return Err(PlanError::TargetIsSymlink(target.to_path_buf()));
    }
    Ok(())
}

fn parent_of(target: &Path) -> &Path {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// A temporary file in the target's directory.
///
/// Dropping the guard without calling [`IntermediateFile::commit`] deletes
/// the temporary file, so readers never observe a partial artefact.
#[derive(Debug)]
pub struct IntermediateFile {
    target: PathBuf,
    temp: TempPath,
}

impl IntermediateFile {
    pub fn create(target: &Path) -> Result<Self, PlanError> {
        check_target(target)?;
        let temp = tempfile::Builder::new()
            .prefix(".stowage-")
            .tempfile_in(parent_of(target))
            .map_err(|source| PlanError::Staging {
                path: target.to_path_buf(),
                source,
            })?
            .into_temp_path();
        Ok(Self {
            target: target.to_path_buf(),
            temp,
        })
    }

    /// Path writers should fill.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Renames the staged file onto the target.
    pub fn commit(self) -> io::Result<()> {
        self.temp
            .persist(&self.target)
            .map_err(|err| err.error)
    }
}

/// A temporary directory holding a single file named `tempfile`.
///
/// For tools that refuse to write into a path that already exists.
#[derive(Debug)]
pub struct IntermediateDir {
    target: PathBuf,
    file: PathBuf,
    _dir: TempDir,
}

impl IntermediateDir {
    pub fn create(target: &Path) -> Result<Self, PlanError> {
        check_target(target)?;
        let dir = tempfile::Builder::new()
            .prefix(".stowage-")
            .tempdir_in(parent_of(target))
            .map_err(|source| PlanError::Staging {
                path: target.to_path_buf(),
                source,
            })?;
        let file = dir.path().join("tempfile");
        Ok(Self {
            target: target.to_path_buf(),
            file,
            _dir: dir,
        })
    }

    /// Path the writing tool should create.
    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// True once the writer has produced the staged file.
    pub fn is_populated(&self) -> bool {
        self.file.is_file()
    }

    /// Moves the staged file onto the target and removes the directory.
    pub fn commit(self) -> io::Result<()> {
        std::fs::rename(&self.file, &self.target)
    }
}
