// ABOUTME: Classifies failed registry pulls from the tool's output.
// ABOUTME: Each kind carries a user-facing message and a remediation hint.

use super::tool::ToolCommand;
use regex::Regex;
use snafu::Snafu;
use std::sync::LazyLock;

/// Everything known about one failed pull attempt.
#[derive(Debug, Clone)]
pub struct PullFailure {
    pub container: String,
    pub library: Option<String>,
    pub address: String,
    pub absolute: bool,
    pub command: ToolCommand,
    pub output: Vec<String>,
}

impl PullFailure {
    fn library(&self) -> &str {
        self.library.as_deref().unwrap_or("<none>")
    }

    fn tag(&self) -> &str {
        let last = self.address.rsplit('/').next().unwrap_or(&self.address);
        last.rsplit_once(':').map_or("latest", |(_, tag)| tag)
    }

    fn not_found_message(&self) -> String {
        if self.absolute {
            format!(
                "the pipeline requested the download of non-existing container image \"{}\"",
                self.address
            )
        } else {
            format!(
                "pulling \"{}\" from \"{}\" failed",
                self.container, self.address
            )
        }
    }

    fn last_line(&self) -> &str {
        self.output
            .iter()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map_or("no output", String::as_str)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PullError {
    #[snafu(display(
        "the specified container library \"{}\" is invalid or unreachable",
        failure.library()
    ))]
    RegistryNotFound { failure: Box<PullFailure> },

    #[snafu(display("{}", failure.not_found_message()))]
    ImageNotFound { failure: Box<PullFailure> },

    #[snafu(display(
        "\"{}\" is not a valid tag of \"{}\"",
        failure.tag(),
        failure.container
    ))]
    InvalidTag { failure: Box<PullFailure> },

    #[snafu(display("image file for \"{}\" already exists", failure.container))]
    ImageExists { failure: Box<PullFailure> },

    #[snafu(display(
        "\"{}\" is no valid Singularity Image Format container",
        failure.container
    ))]
    NoSingularityContainer { failure: Box<PullFailure> },

    #[snafu(display("pulling \"{}\" failed: {}", failure.container, failure.last_line()))]
    Other { failure: Box<PullFailure> },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullErrorKind {
    /// Registry host could not be resolved or reached.
    RegistryNotFound,
    /// Registry answered but has no such image, or refused access.
    ImageNotFound,
    /// Image exists but not with the requested tag.
    InvalidTag,
    /// The tool refused to overwrite an existing file.
    ImageExists,
    /// The artefact is not a single-layer SIF image.
    NoSingularityContainer,
    Other,
}

static CLASSIFIERS: LazyLock<Vec<(Regex, PullErrorKind)>> = LazyLock::new(|| {
    [
        (r"dial\stcp.*no\ssuch\shost", PullErrorKind::RegistryNotFound),
        (
            r"requested\saccess\sto\sthe\sresource\sis\sdenied",
            PullErrorKind::ImageNotFound,
        ),
        (r"StatusCode:\s404", PullErrorKind::ImageNotFound),
        (
            r"invalid\sstatus\scode\sfrom\sregistry\s400",
            PullErrorKind::ImageNotFound,
        ),
        (r"Bad\s?Request", PullErrorKind::ImageNotFound),
        (r"repository\sdoes\snot\sexist", PullErrorKind::ImageNotFound),
        (
            r"Error\sresponse\sfrom\sdaemon:\sHead\s.*:\sdenied",
            PullErrorKind::ImageNotFound,
        ),
        (r"manifest\sunknown", PullErrorKind::InvalidTag),
        (
            r"ORAS\sSIF\simage\sshould\shave\sa\ssingle\slayer",
            PullErrorKind::NoSingularityContainer,
        ),
        (r"Image\sfile\salready\sexists", PullErrorKind::ImageExists),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).expect("classifier pattern is valid"), kind))
    .collect()
});

/// Kind of the first output line that matches a known pattern.
fn classify_lines(lines: &[String]) -> PullErrorKind {
    lines
        .iter()
        .find_map(|line| {
            CLASSIFIERS
                .iter()
                .find(|(pattern, _)| pattern.is_match(line))
                .map(|(_, kind)| *kind)
        })
        .unwrap_or(PullErrorKind::Other)
}

impl PullError {
    /// Builds the error variant matching the tool output in `failure`.
    pub fn classify(failure: PullFailure) -> Self {
        let kind = classify_lines(&failure.output);
        let failure = Box::new(failure);
        match kind {
            PullErrorKind::RegistryNotFound => PullError::RegistryNotFound { failure },
            PullErrorKind::ImageNotFound => PullError::ImageNotFound { failure },
            PullErrorKind::InvalidTag => PullError::InvalidTag { failure },
            PullErrorKind::ImageExists => PullError::ImageExists { failure },
            PullErrorKind::NoSingularityContainer => PullError::NoSingularityContainer { failure },
            PullErrorKind::Other => PullError::Other { failure },
        }
    }

    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> PullErrorKind {
        match self {
            PullError::RegistryNotFound { .. } => PullErrorKind::RegistryNotFound,
            PullError::ImageNotFound { .. } => PullErrorKind::ImageNotFound,
            PullError::InvalidTag { .. } => PullErrorKind::InvalidTag,
            PullError::ImageExists { .. } => PullErrorKind::ImageExists,
            PullError::NoSingularityContainer { .. } => PullErrorKind::NoSingularityContainer,
            PullError::Other { .. } => PullErrorKind::Other,
        }
    }

    pub fn failure(&self) -> &PullFailure {
        match self {
            PullError::RegistryNotFound { failure }
            | PullError::ImageNotFound { failure }
            | PullError::InvalidTag { failure }
            | PullError::ImageExists { failure }
            | PullError::NoSingularityContainer { failure }
            | PullError::Other { failure } => failure,
        }
    }

    /// What the user can do about it.
    pub fn help(&self) -> String {
        let failure = self.failure();
        match self {
            PullError::RegistryNotFound { .. } => format!(
                "Please check, if you made a typo when providing \"-l / --library {}\"",
                failure.library()
            ),
            PullError::ImageNotFound { .. } if failure.absolute => format!(
                "Please try to rerun \"{}\" manually with a different registry.",
                failure.command
            ),
            PullError::ImageNotFound { .. } => format!(
                "Saving image of \"{}\" failed. Please troubleshoot the command \"{}\" manually.",
                failure.container, failure.command
            ),
            PullError::InvalidTag { .. } => format!(
                "Please choose a different library than {} or try to locate the \"{}\" version of \"{}\" manually.",
                failure.library(),
                failure.tag(),
                failure.container
            ),
            PullError::ImageExists { .. } => "Nothing to do.".to_string(),
            PullError::NoSingularityContainer { .. } => format!(
                "Pulling \"{}\" failed, because it appears invalid. To convert from Docker's OCI format, prefix the URI with 'docker://' instead of 'oras://'.",
                failure.container
            ),
            PullError::Other { .. } => format!(
                "Please troubleshoot the command \"{}\" manually.",
                failure.command
            ),
        }
    }
}
