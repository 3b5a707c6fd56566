// ABOUTME: Bounded-parallel HTTP downloads of prebuilt image files.
// ABOUTME: Each file is staged next to its target and renamed only when complete.

use crate::abort::AbortSignal;
use crate::error::{Error, PlanError, Result};
use crate::intermediate::IntermediateFile;
use crate::progress::{ContainerProgress, TaskKind};
use crate::types::ContainerRef;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub dest: PathBuf,
}

/// Terminal state reported once per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Done,
    Error,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct FailedDownload {
    pub job: DownloadJob,
    pub reason: String,
}

/// Raised after a batch in which at least one job failed.
#[derive(Debug, thiserror::Error)]
#[error("{}", describe(.failures))]
pub struct DownloadError {
    pub failures: Vec<FailedDownload>,
}

fn describe(failures: &[FailedDownload]) -> String {
    let mut text = format!("{} download(s) failed", failures.len());
    for failure in failures {
        text.push_str(&format!("\n  {}: {}", failure.job.url, failure.reason));
    }
    text
}

#[derive(Debug, thiserror::Error)]
enum FetchFileError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned an empty body")]
    Empty,

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

/// Downloads files concurrently, publishing each one atomically.
#[derive(Clone)]
pub struct FileDownloader {
    client: reqwest::Client,
    progress: ContainerProgress,
    abort: AbortSignal,
    file_mode: Option<u32>,
}

impl FileDownloader {
    pub fn new(progress: ContainerProgress, abort: AbortSignal, timeout: Duration) -> Result<Self> {
        // Per-read deadline: a slow but live transfer may outlast `timeout`.
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!("stowage/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            progress,
            abort,
            file_mode: None,
        })
    }

    /// Permission bits applied to every completed file.
    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = Some(mode);
        self
    }

    /// Runs `jobs` with at most `parallelism` transfers in flight.
    ///
    /// `on_status` is called on the calling task, exactly once per job, in
    /// completion order. A failing job does not stop the others; failures are
    /// collected into a single [`DownloadError`] once the batch has drained.
    /// After an interrupt, queued jobs report `Cancelled` without starting and
    /// the batch returns [`Error::Interrupted`].
    pub async fn download_files_in_parallel<F>(
        &self,
        jobs: Vec<DownloadJob>,
        parallelism: usize,
        mut on_status: F,
    ) -> Result<Vec<DownloadJob>>
    where
        F: FnMut(&DownloadJob, DownloadStatus),
    {
        let permits = Arc::new(Semaphore::new(parallelism.max(1)));
        let mut set = JoinSet::new();
        let mut pending = HashMap::new();

        for job in jobs {
            let permits = Arc::clone(&permits);
            let worker = self.clone();
            let task_job = job.clone();
            let handle = set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                if worker.abort.is_triggered() {
                    return Err(FetchFileError::Cancelled);
                }
                worker.download_file(&task_job).await
            });
            pending.insert(handle.id(), job);
        }

        let mut completed = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = set.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(err) => {
                    let reason = format!("download task failed: {err}");
                    (err.id(), Err(FetchFileError::Io(std::io::Error::other(reason))))
                }
            };
            let Some(job) = pending.remove(&id) else {
                continue;
            };
            match result {
                Ok(()) => {
                    on_status(&job, DownloadStatus::Done);
                    completed.push(job);
                }
                Err(FetchFileError::Cancelled) => {
                    tracing::debug!(url = %job.url, "download cancelled");
                    on_status(&job, DownloadStatus::Cancelled);
                }
                Err(err) => {
                    tracing::error!(url = %job.url, error = %err, "download failed");
                    on_status(&job, DownloadStatus::Error);
                    failures.push(FailedDownload {
                        job,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if self.abort.is_triggered() {
            return Err(Error::Interrupted);
        }
        if !failures.is_empty() {
            return Err(DownloadError { failures }.into());
        }
        Ok(completed)
    }

    async fn download_file(&self, job: &DownloadJob) -> std::result::Result<(), FetchFileError> {
        let name = ContainerRef::parse(&job.url)
            .map(|reference| reference.nice_name())
            .unwrap_or_else(|_| job.url.clone());
        let task = self.progress.add_task(&name, TaskKind::Download, None);
        let staged = IntermediateFile::create(&job.dest)?;
        tracing::debug!(url = %job.url, dest = %job.dest.display(), "downloading");

        let mut response = self.client.get(&job.url).send().await?.error_for_status()?;
        if let Some(length) = response.content_length() {
            task.set_total(length);
        }

        let mut file = tokio::fs::File::create(staged.path()).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            if self.abort.is_triggered() {
                return Err(FetchFileError::Cancelled);
            }
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            task.advance(chunk.len() as u64);
        }
        file.flush().await?;
        drop(file);

        if written == 0 {
            return Err(FetchFileError::Empty);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = self.file_mode {
                let permissions = std::fs::Permissions::from_mode(mode);
                tokio::fs::set_permissions(staged.path(), permissions).await?;
            }
        }

        staged.commit()?;
        Ok(())
    }
}
