// ABOUTME: Injected user prompts so the provisioning core runs headless in tests and CI.
// ABOUTME: TerminalPrompter asks on stderr/stdin; NonInteractive never asks.

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

pub trait Prompter: Send + Sync {
    /// Whether a person can answer questions right now.
    fn is_interactive(&self) -> bool;

    /// Asks a yes/no question. Anything but an explicit yes is a no.
    fn confirm(&self, question: &str) -> bool;

    /// Asks for a path. An empty answer means none.
    fn ask_path(&self, question: &str) -> Option<PathBuf>;
}

/// Never interactive; every question gets the default answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn is_interactive(&self) -> bool {
        false
    }

    fn confirm(&self, _question: &str) -> bool {
        false
    }

    fn ask_path(&self, _question: &str) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn ask(&self, question: &str) -> Option<String> {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "{question} ");
        let _ = stderr.flush();

        let mut response = String::new();
        match std::io::stdin().lock().read_line(&mut response) {
            Ok(0) => None,
            Ok(_) => Some(response.trim().to_string()),
            Err(e) => {
                tracing::warn!("error reading response: {e}");
                None
            }
        }
    }
}

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
    }

    fn confirm(&self, question: &str) -> bool {
        self.ask(&format!("{question} [y/N]"))
            .is_some_and(|answer| answer.starts_with('y') || answer.starts_with('Y'))
    }

    fn ask_path(&self, question: &str) -> Option<PathBuf> {
        self.ask(question)
            .filter(|answer| !answer.is_empty())
            .map(PathBuf::from)
    }
}
