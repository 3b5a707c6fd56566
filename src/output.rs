// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON-lines output modes.

use crate::diagnostics::{Diagnostics, WarningKind};
use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Only the final result and problems
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

fn kind_name(kind: WarningKind) -> &'static str {
    match kind {
        WarningKind::PullFailed => "pull_failed",
        WarningKind::CopySourceMissing => "copy_source_missing",
        WarningKind::SymlinkFailed => "symlink_failed",
        WarningKind::IndexIgnored => "index_ignored",
        WarningKind::UnparsableContainer => "unparsable_container",
    }
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    fn json(&self, event: &str, message: &str, kind: Option<&str>) -> Option<String> {
        let event = JsonEvent {
            event,
            message,
            kind,
            duration_secs: self.duration(),
        };
        serde_json::to_string(&event).ok()
    }

    /// Print a progress message (suppressed in quiet mode).
    pub fn progress(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => println!("{message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => {
                if let Some(json) = self.json("progress", message, None) {
                    println!("{json}");
                }
            }
        }
    }

    /// Print a multi-line hint, such as how to load the images offline.
    pub fn info(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => println!("\n{message}\n"),
            OutputMode::Quiet => {}
            OutputMode::Json => {
                if let Some(json) = self.json("info", message, None) {
                    println!("{json}");
                }
            }
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => {
                if let Some(json) = self.json("success", message, None) {
                    println!("{json}");
                }
            }
        }
    }

    /// Print one discovered image and the file it is stored as.
    pub fn image(&self, reference: &str, artefact: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => println!("{reference}\t{artefact}"),
            OutputMode::Json => {
                let line = serde_json::json!({
                    "event": "image",
                    "reference": reference,
                    "artefact": artefact,
                });
                println!("{line}");
            }
        }
    }

    /// Print the problems collected during a run. They do not fail the run.
    pub fn diagnostics(&self, diagnostics: &Diagnostics) {
        if !diagnostics.has_warnings() {
            return;
        }
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("{} problem(s) occurred:", diagnostics.warnings().len());
                for warning in diagnostics.warnings() {
                    let first = warning.message.lines().next().unwrap_or_default();
                    eprintln!("  - {first}");
                }
            }
            OutputMode::Json => {
                for warning in diagnostics.warnings() {
                    if let Some(json) =
                        self.json("warning", &warning.message, Some(kind_name(warning.kind)))
                    {
                        eprintln!("{json}");
                    }
                }
            }
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => {
                if let Some(json) = self.json("error", message, None) {
                    eprintln!("{json}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_events_omit_empty_fields() {
        let output = Output::new(OutputMode::Json);
        let json = output.json("warning", "pull failed", Some("pull_failed")).unwrap();
        assert_eq!(
            json,
            r#"{"event":"warning","message":"pull failed","kind":"pull_failed"}"#
        );
    }
}
