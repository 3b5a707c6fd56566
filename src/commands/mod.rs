// ABOUTME: Command module aggregator for the stowage CLI.
// ABOUTME: Re-exports the download and images command handlers.

mod download;
mod images;

pub use download::download;
pub use images::images;
