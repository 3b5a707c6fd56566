// ABOUTME: Multi-row progress display for container fetching.
// ABOUTME: One summary row (task 0) plus transient rows per pull, save, or download.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// Identifier of a progress row. The summary row is always [`MAIN_TASK`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

pub const MAIN_TASK: TaskId = TaskId(0);

/// Row layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Overall completion: bar, percentage and `n/total` count.
    Summary,
    /// Singularity or Apptainer pull: name, last tool output line, spinner.
    SingularityPull,
    /// Docker pull and save: name, bar, current status.
    Docker,
    /// HTTP download: name, bar, percentage, bytes and transfer rate.
    Download,
    Other,
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .expect("parse progress bar template")
        .progress_chars("━╸ ")
}

static SUMMARY_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    style("{prefix:.magenta.bold} {bar:40.magenta} {percent:>3}% • {pos}/{len} tasks completed")
});
static PULL_STYLE: LazyLock<ProgressStyle> =
    LazyLock::new(|| style("{spinner:.blue} {prefix:.magenta} {wide_msg:.dim}"));
static DOCKER_STYLE: LazyLock<ProgressStyle> =
    LazyLock::new(|| style("{prefix:.magenta} {bar:30.blue} ({msg:.blue})"));
static DOWNLOAD_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    style("{prefix:.blue} {bar:40.blue} {percent:>3}% • {bytes}/{total_bytes} • {bytes_per_sec}")
});
static OTHER_STYLE: LazyLock<ProgressStyle> =
    LazyLock::new(|| style("{prefix:.magenta} {wide_msg}"));

impl TaskKind {
    fn style(self) -> ProgressStyle {
        match self {
            TaskKind::Summary => SUMMARY_STYLE.clone(),
            TaskKind::SingularityPull => PULL_STYLE.clone(),
            TaskKind::Docker => DOCKER_STYLE.clone(),
            TaskKind::Download => DOWNLOAD_STYLE.clone(),
            TaskKind::Other => OTHER_STYLE.clone(),
        }
    }
}

/// Partial update of the summary row. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MainTaskUpdate {
    pub advance: Option<u64>,
    pub description: Option<String>,
    pub total: Option<u64>,
    pub completed: Option<u64>,
}

impl MainTaskUpdate {
    pub fn advance(steps: u64) -> Self {
        Self {
            advance: Some(steps),
            ..Self::default()
        }
    }

    pub fn total(total: u64) -> Self {
        Self {
            total: Some(total),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Point-in-time view of a row, mainly for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub kind: TaskKind,
    pub name: String,
    pub position: u64,
    pub total: Option<u64>,
    pub message: String,
}

struct Row {
    bar: ProgressBar,
    kind: TaskKind,
}

#[derive(Default)]
struct Rows {
    rows: BTreeMap<TaskId, Row>,
    next_id: u64,
}

struct Inner {
    multi: MultiProgress,
    hidden: bool,
    rows: Mutex<Rows>,
}

/// Shared handle to the progress display. Cheap to clone.
#[derive(Clone)]
pub struct ContainerProgress {
    inner: Arc<Inner>,
}

impl ContainerProgress {
    pub fn new(hidden: bool) -> Self {
        let multi = if hidden {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            inner: Arc::new(Inner {
                multi,
                hidden,
                rows: Mutex::new(Rows {
                    rows: BTreeMap::new(),
                    next_id: 1,
                }),
            }),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.inner.hidden
    }

    /// Creates the summary row, or resets its total if it already exists.
    pub fn add_main_task(&self, total: u64, description: &str) -> TaskId {
        let mut rows = self.inner.rows.lock();
        if let Some(row) = rows.rows.get(&MAIN_TASK) {
            row.bar.set_length(total);
            row.bar.set_prefix(description.to_string());
            return MAIN_TASK;
        }
        let bar = self.inner.multi.insert(0, ProgressBar::new(total));
        bar.set_style(TaskKind::Summary.style());
        bar.set_prefix(description.to_string());
        rows.rows.insert(
            MAIN_TASK,
            Row {
                bar,
                kind: TaskKind::Summary,
            },
        );
        MAIN_TASK
    }

    /// Applies `update` to the summary row.
    ///
    /// Completion callbacks can race with the row's removal; a missing row is
    /// logged at debug level and otherwise ignored.
    pub fn update_main_task(&self, update: MainTaskUpdate) {
        let rows = self.inner.rows.lock();
        let Some(row) = rows.rows.get(&MAIN_TASK) else {
            tracing::debug!(?update, "summary task already removed");
            return;
        };
        if let Some(total) = update.total {
            row.bar.set_length(total);
        }
        if let Some(completed) = update.completed {
            row.bar.set_position(completed);
        }
        if let Some(steps) = update.advance {
            row.bar.inc(steps);
        }
        if let Some(description) = update.description {
            row.bar.set_prefix(description);
        }
    }

    pub fn remove_main_task(&self) {
        self.remove(MAIN_TASK);
    }

    /// Adds a transient row that disappears when the returned guard drops.
    pub fn add_task(&self, name: &str, kind: TaskKind, total: Option<u64>) -> SubTask {
        let bar = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        let bar = self.inner.multi.add(bar);
        bar.set_style(kind.style());
        bar.set_prefix(name.to_string());
        if total.is_none() && !self.inner.hidden {
            bar.enable_steady_tick(Duration::from_millis(120));
        }

        let mut rows = self.inner.rows.lock();
        let id = TaskId(rows.next_id);
        rows.next_id += 1;
        rows.rows.insert(id, Row { bar, kind });
        SubTask {
            progress: self.clone(),
            id,
        }
    }

    pub fn snapshot(&self, id: TaskId) -> Option<TaskSnapshot> {
        let rows = self.inner.rows.lock();
        rows.rows.get(&id).map(|row| TaskSnapshot {
            kind: row.kind,
            name: row.bar.prefix(),
            position: row.bar.position(),
            total: row.bar.length(),
            message: row.bar.message(),
        })
    }

    /// Number of rows currently displayed, summary included.
    pub fn task_count(&self) -> usize {
        self.inner.rows.lock().rows.len()
    }

    /// Runs `f` with the display cleared so plain output is not overdrawn.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.multi.suspend(f)
    }

    fn with_row(&self, id: TaskId, f: impl FnOnce(&ProgressBar)) {
        if let Some(row) = self.inner.rows.lock().rows.get(&id) {
            f(&row.bar);
        }
    }

    fn remove(&self, id: TaskId) {
        let removed = self.inner.rows.lock().rows.remove(&id);
        if let Some(row) = removed {
            row.bar.finish_and_clear();
            self.inner.multi.remove(&row.bar);
        }
    }
}

/// Guard for a transient row.
pub struct SubTask {
    progress: ContainerProgress,
    id: TaskId,
}

impl SubTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn advance(&self, steps: u64) {
        self.progress.with_row(self.id, |bar| bar.inc(steps));
    }

    pub fn set_total(&self, total: u64) {
        self.progress.with_row(self.id, |bar| {
            bar.disable_steady_tick();
            bar.set_length(total);
        });
    }

    /// Latest line of tool output, or a status word such as "Pulling".
    pub fn set_message(&self, message: &str) {
        let message = message.trim().to_string();
        self.progress.with_row(self.id, |bar| bar.set_message(message));
    }
}

impl Drop for SubTask {
    fn drop(&mut self) {
        self.progress.remove(self.id);
    }
}

/// Stderr writer that clears the progress rows around each write.
pub struct SuspendingStderr {
    multi: MultiProgress,
}

impl Write for SuspendingStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ContainerProgress {
    type Writer = SuspendingStderr;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendingStderr {
            multi: self.inner.multi.clone(),
        }
    }
}
