// ABOUTME: Diagnostics accumulator for non-fatal warnings during a deployment.
// ABOUTME: Warnings never fail a deployment but are kept on the record and shown to operators.

use serde::{Deserialize, Serialize};

/// Collects non-fatal warnings during deployment operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Old release could not be removed during retention cleanup.
    pub fn release_cleanup(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ReleaseCleanup,
            message: message.into(),
        }
    }

    /// A live release could not be written to the release store.
    pub fn release_record(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ReleaseRecord,
            message: message.into(),
        }
    }

    /// Release size could not be measured.
    pub fn release_size(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ReleaseSize,
            message: message.into(),
        }
    }

    /// Leftover temporary activation link could not be removed.
    pub fn activation_leftover(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ActivationLeftover,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    ReleaseCleanup,
    ReleaseRecord,
    ReleaseSize,
    ActivationLeftover,
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
    fn diagnostics_collects_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::release_cleanup("permission denied on releases/r1"));
        diag.warn(Warning::release_size("releases/r2 vanished"));

        assert!(diag.has_warnings());
        assert_eq!(diag.into_warnings().len(), 2);
    }

    #[test]
    fn warning_constructors_set_correct_kind() {
        assert_eq!(
            Warning::release_cleanup("x").kind,
            WarningKind::ReleaseCleanup
        );
        assert_eq!(Warning::release_size("x").kind, WarningKind::ReleaseSize);
        assert_eq!(Warning::release_record("x").kind, WarningKind::ReleaseRecord);
        assert_eq!(
            Warning::activation_leftover("x").kind,
            WarningKind::ActivationLeftover
        );
    }
}
