// ABOUTME: Runs external container tools and streams their output line by line.
// ABOUTME: The ToolRunner trait lets tests replay canned tool output.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// A program invocation, kept as data so it can be logged and asserted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of running a tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Interleaved stdout and stderr lines, in arrival order.
    pub lines: Vec<String>,
}

impl ToolOutput {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs `command`, calling `on_line` for every output line as it arrives.
    async fn run(
        &self,
        command: &ToolCommand,
        on_line: &(dyn for<'a> Fn(&'a str) + Send + Sync),
    ) -> std::io::Result<ToolOutput>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

async fn forward_lines<R>(reader: R, lines: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        if lines.send(line).is_err() {
            break;
        }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        command: &ToolCommand,
        on_line: &(dyn for<'a> Fn(&'a str) + Send + Sync),
    ) -> std::io::Result<ToolOutput> {
        tracing::debug!(command = %command, "running tool");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
        }
        drop(tx);

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            on_line(&line);
            lines.push(line);
        }
        futures::future::join_all(readers).await;

        let status = child.wait().await?;
        Ok(ToolOutput {
            success: status.success(),
            exit_code: status.code(),
            lines,
        })
    }
}
