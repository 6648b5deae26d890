// ABOUTME: Deployment lifecycle states and the legal transition table.
// ABOUTME: Every status change in the crate goes through `DeploymentStatus::next`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a deployment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Waiting for a human to approve or reject.
    PendingApproval,
    /// Approved; immediately becomes `Queued`.
    Approved,
    /// Ready for the dispatcher.
    Queued,
    /// Story is executing.
    Running,
    Success,
    Failed,
    Rejected,
    Expired,
}

/// Events that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Approve,
    Enqueue,
    Reject,
    Expire,
    Start,
    Succeed,
    Fail,
    Cancel,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 8] = [
        DeploymentStatus::PendingApproval,
        DeploymentStatus::Approved,
        DeploymentStatus::Queued,
        DeploymentStatus::Running,
        DeploymentStatus::Success,
        DeploymentStatus::Failed,
        DeploymentStatus::Rejected,
        DeploymentStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::PendingApproval => "pending_approval",
            DeploymentStatus::Approved => "approved",
            DeploymentStatus::Queued => "queued",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Rejected => "rejected",
            DeploymentStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success
                | DeploymentStatus::Failed
                | DeploymentStatus::Rejected
                | DeploymentStatus::Expired
        )
    }

    /// Active records block new deployments for the same app and trigger.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Target state for `event`, or `None` if the transition is illegal.
    pub fn next(self, event: Transition) -> Option<DeploymentStatus> {
        use DeploymentStatus::*;
        match (self, event) {
            (PendingApproval, Transition::Approve) => Some(Approved),
            (Approved, Transition::Enqueue) => Some(Queued),
            (PendingApproval, Transition::Reject) => Some(Rejected),
            (PendingApproval, Transition::Expire) => Some(Expired),
            (Queued, Transition::Start) => Some(Running),
            (Running, Transition::Succeed) => Some(Success),
            (Running, Transition::Fail) => Some(Failed),
            (status, Transition::Cancel) if status.is_active() => Some(Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeploymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown deployment status '{s}'"))
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Approve => "approve",
            Transition::Enqueue => "enqueue",
            Transition::Reject => "reject",
            Transition::Expire => "expire",
            Transition::Start => "start",
            Transition::Succeed => "succeed",
            Transition::Fail => "fail",
            Transition::Cancel => "cancel",
        };
        f.write_str(name)
    }
}
