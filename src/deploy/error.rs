// ABOUTME: Error types for deployment orchestration.
// ABOUTME: Covers lookup, authorization, state, conflict, and execution failures.

use chrono::{DateTime, Utc};

use super::status::{DeploymentStatus, Transition};
use crate::runner::RunnerError;
use crate::store::StoreError;
use crate::types::DeploymentId;

/// Errors raised by orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("app not found: {0}")]
    AppNotFound(String),

    #[error("trigger '{trigger}' not found for app '{app}'")]
    TriggerNotFound { app: String, trigger: String },

    /// Unknown id, or an approval token that does not verify.
    #[error("deployment not found")]
    NotFound,

    #[error("approval for deployment {id} expired at {expired_at}")]
    Expired {
        id: DeploymentId,
        expired_at: DateTime<Utc>,
    },

    #[error("cannot {action} deployment {id} in status {status}")]
    WrongStatus {
        id: DeploymentId,
        status: DeploymentStatus,
        action: Transition,
    },

    #[error("deployment {id} has not reached its approval expiry")]
    NotExpired { id: DeploymentId },

    #[error("deployment {active} is already active for {app}/{trigger}")]
    Conflict {
        active: DeploymentId,
        app: String,
        trigger: String,
    },

    #[error("{app}/{trigger} is locked by {holder} since {since}")]
    LockHeld {
        app: String,
        trigger: String,
        holder: String,
        since: DateTime<Utc>,
    },

    #[error("lock failure: {0}")]
    Lock(String),

    #[error("delivery {0} was already processed")]
    Duplicate(String),

    #[error("no previous release to roll back to for app '{0}'")]
    NoPreviousRelease(String),

    #[error("release '{release}' not found for app '{app}'")]
    ReleaseNotFound { app: String, release: String },

    #[error("invalid rollback target: {0}")]
    InvalidRollback(String),

    #[error("approvals are not configured (settings.approval_secret is unset)")]
    ApprovalUnavailable,

    #[error("execution failed: {0}")]
    Execution(String),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    /// Unknown app or trigger.
    Configuration,
    /// Unknown deployment or invalid token.
    NotFound,
    /// Approval window closed.
    Expired,
    /// Operation not valid from the current status.
    State,
    /// Another deployment is active, or the delivery was seen before.
    Conflict,
    /// Release selection failed.
    Release,
    /// Strategy or runner failure.
    Execution,
    /// Persistence failure.
    Storage,
}

impl DeployError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::AppNotFound(_)
            | DeployError::TriggerNotFound { .. }
            | DeployError::ApprovalUnavailable => DeployErrorKind::Configuration,
            DeployError::NotFound => DeployErrorKind::NotFound,
            DeployError::Expired { .. } => DeployErrorKind::Expired,
            DeployError::WrongStatus { .. } | DeployError::NotExpired { .. } => {
                DeployErrorKind::State
            }
            DeployError::Conflict { .. }
            | DeployError::LockHeld { .. }
            | DeployError::Duplicate(_) => DeployErrorKind::Conflict,
            DeployError::NoPreviousRelease(_)
            | DeployError::ReleaseNotFound { .. }
            | DeployError::InvalidRollback(_) => DeployErrorKind::Release,
            DeployError::Execution(_) | DeployError::Runner(_) => DeployErrorKind::Execution,
            DeployError::Store(_) | DeployError::Lock(_) => DeployErrorKind::Storage,
        }
    }

    /// The active deployment that caused a conflict.
    pub fn conflicting_deployment(&self) -> Option<DeploymentId> {
        match self {
            DeployError::Conflict { active, .. } => Some(*active),
            _ => None,
        }
    }

    pub(crate) fn wrong_status(
        id: DeploymentId,
        status: DeploymentStatus,
        action: Transition,
    ) -> Self {
        DeployError::WrongStatus { id, status, action }
    }
}
