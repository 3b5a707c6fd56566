// ABOUTME: Diagnostics accumulator for non-fatal problems while provisioning.
// ABOUTME: Collects failures that shouldn't abort the run but must be reported at the end.

/// Collects non-fatal warnings during a provisioning run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Record a warning that was already logged at error level.
    pub fn record(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Moves every warning from `other` into this collection.
    pub fn merge(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}

/// A non-fatal warning collected during provisioning.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn pull_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::PullFailed,
            message: message.into(),
        }
    }

    pub fn copy_source_missing(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CopySourceMissing,
            message: message.into(),
        }
    }

    pub fn symlink_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SymlinkFailed,
            message: message.into(),
        }
    }

    pub fn index_ignored(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::IndexIgnored,
            message: message.into(),
        }
    }

    pub fn unparsable_container(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::UnparsableContainer,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// An image could not be pulled from any candidate library.
    PullFailed,
    /// A planned copy found no source file.
    CopySourceMissing,
    /// A registry alias symlink could not be created.
    SymlinkFailed,
    /// The remote cache index was unusable and is being ignored.
    IndexIgnored,
    /// A container declaration could not be resolved to a reference.
    UnparsableContainer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_counts_by_kind() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::pull_failed("fastqc"));
        diag.record(Warning::pull_failed("multiqc"));
        diag.warn(Warning::symlink_failed("permission denied"));

        assert!(diag.has_warnings());
        assert_eq!(diag.count(WarningKind::PullFailed), 2);
        assert_eq!(diag.count(WarningKind::SymlinkFailed), 1);
        assert_eq!(diag.count(WarningKind::IndexIgnored), 0);
    }
}
