// ABOUTME: Provides workflow working trees and lays out the output directory.
// ABOUTME: The built-in source copies a local tree; forge checkouts are left to other providers.

use crate::error::{ConfigError, Error, PlanError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9a-zA-Z]+").expect("valid slug regex"));

/// Supplies the working tree of a pipeline at a revision.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    /// Short name used for default output paths.
    fn pipeline_name(&self, pipeline: &str) -> String;

    /// Revisions to provision when none were requested.
    fn default_revisions(&self, pipeline: &str) -> Result<Vec<String>>;

    /// Writes the tree of `pipeline` at `revision` into `dest`.
    async fn materialise(&self, pipeline: &str, revision: &str, dest: &Path) -> Result<()>;
}

/// Serves pipelines that already exist as a local directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalWorkflowSource;

impl LocalWorkflowSource {
    fn tree(pipeline: &str) -> Result<PathBuf> {
        let path = PathBuf::from(pipeline);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(ConfigError::UnsupportedPipelineSource(pipeline.to_string()).into())
        }
    }
}

fn copy_tree(src: &Path, dest: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src).into_iter().filter_entry(|e| e.file_name() != ".git") {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[async_trait]
impl WorkflowSource for LocalWorkflowSource {
    fn pipeline_name(&self, pipeline: &str) -> String {
        Path::new(pipeline)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| pipeline.to_string())
    }

    fn default_revisions(&self, pipeline: &str) -> Result<Vec<String>> {
        Self::tree(pipeline)?;
        Ok(vec![self.pipeline_name(pipeline)])
    }

    async fn materialise(&self, pipeline: &str, revision: &str, dest: &Path) -> Result<()> {
        let src = Self::tree(pipeline)?;
        tracing::debug!(
            src = %src.display(),
            dest = %dest.display(),
            revision,
            "copying local workflow tree"
        );
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || copy_tree(&src, &dest))
            .await
            .map_err(std::io::Error::other)??;
        Ok(())
    }
}

/// File-system safe directory name for a revision's working tree.
///
/// Names that would collide with the shared `configs` directory or the
/// images directory are prefixed with the pipeline name.
pub fn revision_slug(pipeline: &str, revision: &str, images_dir: &str) -> String {
    let slug = NON_ALPHANUMERIC.replace_all(revision, "_").into_owned();
    if slug == "configs" || slug == images_dir {
        NON_ALPHANUMERIC
            .replace_all(&format!("{pipeline}{slug}"), "_")
            .into_owned()
    } else {
        slug
    }
}

/// Output directory used when none is given.
pub fn default_output_dir<Tz>(pipeline: &str, revisions: &[String], now: DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let name = pipeline.replace('/', "-").to_lowercase();
    match revisions {
        [revision] => PathBuf::from(format!("{name}_{revision}")),
        _ => PathBuf::from(format!("{name}_{}", now.format("%Y-%m-%d_%H-%M"))),
    }
}

/// Creates a fresh output directory, replacing an existing one only with `force`.
pub fn prepare_output_dir(path: &Path, force: bool) -> Result<()> {
    if let Ok(metadata) = std::fs::symlink_metadata(path) {
        if !force {
            return Err(PlanError::OutputDirExists(path.to_path_buf()).into());
        }
        tracing::info!(path = %path.display(), "removing existing output directory");
        if metadata.is_dir() {
            std::fs::remove_dir_all(path)?;
        } else {
            std::fs::remove_file(path)?;
        }
    }
    std::fs::create_dir_all(path).map_err(Error::from)
}
