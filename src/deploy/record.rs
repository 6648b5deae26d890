// ABOUTME: The persisted deployment record and the request that creates one.
// ABOUTME: Holds trigger, commit, approval, and execution fields for one attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::status::DeploymentStatus;
use crate::approval::TokenDigest;
use crate::config::{AppConfig, EventKind, StrategyKind};
use crate::types::{AppKey, DeploymentId, ReleaseName};

/// Trigger name used for operator-initiated rollbacks.
pub const ROLLBACK_TRIGGER: &str = "rollback";

/// What a record does when dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeploymentAction {
    Deploy,
    Rollback { target: RollbackTarget },
}

/// Where a rollback should land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackTarget {
    /// Named release (advanced) or git ref (simple).
    Release(String),
    /// Go back this many releases; zero counts as one.
    Steps(u32),
}

impl Default for RollbackTarget {
    fn default() -> Self {
        RollbackTarget::Steps(1)
    }
}

impl RollbackTarget {
    pub fn steps(&self) -> u32 {
        match self {
            RollbackTarget::Steps(n) => (*n).max(1),
            RollbackTarget::Release(_) => 1,
        }
    }
}

impl fmt::Display for RollbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackTarget::Release(name) => f.write_str(name),
            RollbackTarget::Steps(n) => write!(f, "{n} step(s) back"),
        }
    }
}

/// Kind of trigger recorded on a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Push,
    Release,
    Rollback,
}

impl From<EventKind> for TriggerKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Push => TriggerKind::Push,
            EventKind::Release => TriggerKind::Release,
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerKind::Push => "push",
            TriggerKind::Release => "release",
            TriggerKind::Rollback => "rollback",
        })
    }
}

/// Who asked for the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentSource {
    Webhook,
    Operator,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalFields {
    /// Keyed digest of the approval token. The plaintext is never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_hash: Option<TokenDigest>,
    pub expires_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFields {
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: Option<u64>,
    /// `hostname:pid` of the process that ran the story.
    pub worker: Option<String>,
}

/// One deployment attempt. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub app_key: AppKey,
    pub app_name: String,
    pub action: DeploymentAction,
    pub source: DeploymentSource,
    pub trigger_name: String,
    pub trigger_kind: TriggerKind,
    pub trigger_ref: String,
    pub repository: Option<String>,
    pub commit_sha: String,
    pub commit_message: Option<String>,
    pub author: String,
    pub strategy: StrategyKind,
    pub release_name: Option<ReleaseName>,
    pub release_path: Option<PathBuf>,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub approval: ApprovalFields,
    #[serde(default)]
    pub execution: ExecutionFields,
    pub delivery_id: Option<String>,
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to open a record, minus what comes from the app.
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub trigger_name: String,
    pub trigger_kind: TriggerKind,
    pub git_ref: String,
    pub repository: Option<String>,
    pub commit_sha: String,
    pub commit_message: Option<String>,
    pub author: String,
    pub delivery_id: Option<String>,
    pub payload: serde_json::Value,
    pub action: DeploymentAction,
    pub source: DeploymentSource,
}

/// Approval requirement attached at creation.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub token_hash: TokenDigest,
    pub expires_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Open a record in `pending_approval` when approval is attached, else `queued`.
    pub fn open(
        app: &AppConfig,
        request: NewDeployment,
        approval: Option<PendingApproval>,
        now: DateTime<Utc>,
    ) -> Self {
        let idempotency_key = request
            .delivery_id
            .as_deref()
            .map(|delivery| idempotency_key(delivery, &app.key, &request.trigger_name));

        let (status, approval, queued_at) = match approval {
            Some(pending) => (
                DeploymentStatus::PendingApproval,
                ApprovalFields {
                    token_hash: Some(pending.token_hash),
                    expires_at: Some(pending.expires_at),
                    ..ApprovalFields::default()
                },
                None,
            ),
            None => (DeploymentStatus::Queued, ApprovalFields::default(), Some(now)),
        };

        Self {
            id: DeploymentId::generate(),
            app_key: app.key.clone(),
            app_name: app.name.clone(),
            action: request.action,
            source: request.source,
            trigger_name: request.trigger_name,
            trigger_kind: request.trigger_kind,
            trigger_ref: request.git_ref,
            repository: request.repository,
            commit_sha: request.commit_sha,
            commit_message: request.commit_message,
            author: request.author,
            strategy: app.strategy,
            release_name: None,
            release_path: None,
            status,
            approval,
            execution: ExecutionFields {
                queued_at,
                ..ExecutionFields::default()
            },
            delivery_id: request.delivery_id,
            idempotency_key,
            payload: request.payload,
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_rollback(&self) -> bool {
        matches!(self.action, DeploymentAction::Rollback { .. })
    }

    /// Copy suitable for status queries: the token digest is dropped.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.approval.token_hash = None;
        copy
    }
}

/// Key that makes a repeated delivery resolve to the same record.
pub fn idempotency_key(delivery_id: &str, app: &AppKey, trigger: &str) -> String {
    format!("{delivery_id}:{app}:{trigger}")
}
