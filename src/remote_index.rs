// ABOUTME: Reads the index of images already present in the deployment host's cache.
// ABOUTME: Listed artefacts are excluded from fetching; unusable indexes degrade to no exclusion.

use crate::diagnostics::{Diagnostics, Warning};
use crate::prompt::Prompter;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static IMAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^/\\]+\.img").expect("valid image name regex"));

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("cannot read remote cache index {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no image names found in remote cache index {0}")]
    NoImages(PathBuf),
}

/// First image file name on each line, sorted and de-duplicated.
pub fn parse_remote_index(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .filter_map(|line| IMAGE_NAME.find(line))
        .map(|found| found.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn read_remote_index(path: &Path) -> Result<BTreeSet<String>, IndexError> {
    let content = std::fs::read_to_string(path).map_err(|source| IndexError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let images = parse_remote_index(&content);
    if images.is_empty() {
        return Err(IndexError::NoImages(path.to_path_buf()));
    }
    tracing::debug!(count = images.len(), path = %path.display(), "read remote cache index");
    Ok(images)
}

/// Reads the index at `path`, letting an attached user pick another file on failure.
///
/// Returns `None` when no usable index was obtained; the run then proceeds
/// without remote exclusion.
pub fn resolve_remote_index(
    path: &Path,
    prompter: &dyn Prompter,
    diagnostics: &mut Diagnostics,
) -> Option<BTreeSet<String>> {
    let mut path = path.to_path_buf();
    loop {
        let err = match read_remote_index(&path) {
            Ok(images) => return Some(images),
            Err(err) => err,
        };
        tracing::error!("{err}");

        if prompter.is_interactive()
            && prompter.confirm("Specify a new index file and try again?")
            && let Some(next) = prompter.ask_path(
                "List of the container images already present on the remote system:",
            )
        {
            path = next;
            continue;
        }

        diagnostics.warn(Warning::index_ignored(format!(
            "proceeding without the remote cache index: {err}"
        )));
        return None;
    }
}
