// ABOUTME: Library root for stowage - exposes the provisioning modules for the CLI and tests.
// ABOUTME: The main binary is in main.rs.

pub mod abort;
pub mod canonical;
pub mod config;
pub mod diagnostics;
pub mod discover;
pub mod download;
pub mod error;
pub mod fetcher;
pub mod intermediate;
pub mod output;
pub mod progress;
pub mod prompt;
pub mod registries;
pub mod remote_index;
pub mod tooling;
pub mod types;
pub mod workflow;
