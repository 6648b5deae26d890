// ABOUTME: State transitions applied to a deployment record.
// ABOUTME: Each method checks the transition table and fills the matching fields.

use chrono::{DateTime, Utc};

use super::error::DeployError;
use super::record::DeploymentRecord;
use super::status::{DeploymentStatus, Transition};

/// Reason recorded when a rejection carries none.
pub const DEFAULT_REJECTION_REASON: &str = "No reason provided";

/// Exit code recorded when the story exceeds its time limit.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code recorded when the story could not be run at all.
pub const UNSTARTED_EXIT_CODE: i32 = 1;

/// Result of a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionResult {
    pub from: DeploymentStatus,
    pub to: DeploymentStatus,
}

impl DeploymentRecord {
    fn apply(&mut self, event: Transition, now: DateTime<Utc>) -> Result<TransitionResult, DeployError> {
        let to = self
            .status
            .next(event)
            .ok_or_else(|| DeployError::wrong_status(self.id, self.status, event))?;
        let from = self.status;
        self.status = to;
        self.updated_at = now;
        Ok(TransitionResult { from, to })
    }

    /// `pending_approval -> approved -> queued`.
    ///
    /// An expired approval is refused with `Expired` and the record is left
    /// untouched so the sweep can still mark it.
    pub fn approve(&mut self, actor: &str, now: DateTime<Utc>) -> Result<TransitionResult, DeployError> {
        if self.status != DeploymentStatus::PendingApproval {
            return Err(DeployError::wrong_status(self.id, self.status, Transition::Approve));
        }
        if let Some(expired_at) = self.approval.expires_at
            && now > expired_at
        {
            return Err(DeployError::Expired {
                id: self.id,
                expired_at,
            });
        }

        let approved = self.apply(Transition::Approve, now)?;
        self.approval.approved_by = Some(actor.to_string());
        self.approval.approved_at = Some(now);

        let queued = self.apply(Transition::Enqueue, now)?;
        self.execution.queued_at = Some(now);

        Ok(TransitionResult {
            from: approved.from,
            to: queued.to,
        })
    }

    /// `pending_approval -> rejected`. Allowed after the approval window closed.
    pub fn reject(
        &mut self,
        actor: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TransitionResult, DeployError> {
        let result = self.apply(Transition::Reject, now)?;
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REJECTION_REASON);
        self.approval.rejected_by = Some(actor.to_string());
        self.approval.rejected_at = Some(now);
        self.approval.rejection_reason = Some(reason.to_string());
        Ok(result)
    }

    /// `pending_approval -> expired`, only once the window has closed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<TransitionResult, DeployError> {
        if self.status != DeploymentStatus::PendingApproval {
            return Err(DeployError::wrong_status(self.id, self.status, Transition::Expire));
        }
        match self.approval.expires_at {
            Some(expires_at) if now > expires_at => self.apply(Transition::Expire, now),
            _ => Err(DeployError::NotExpired { id: self.id }),
        }
    }

    /// `queued -> running`.
    pub fn start(&mut self, worker: &str, now: DateTime<Utc>) -> Result<TransitionResult, DeployError> {
        let result = self.apply(Transition::Start, now)?;
        self.execution.started_at = Some(now);
        self.execution.worker = Some(worker.to_string());
        Ok(result)
    }

    /// `running -> success | failed` depending on `success`.
    pub fn finish(
        &mut self,
        success: bool,
        output: String,
        exit_code: i32,
        now: DateTime<Utc>,
    ) -> Result<TransitionResult, DeployError> {
        let event = if success {
            Transition::Succeed
        } else {
            Transition::Fail
        };
        let result = self.apply(event, now)?;
        self.complete(output, Some(exit_code), now);
        Ok(result)
    }

    /// Any active status `-> failed`, recording who cancelled and why.
    pub fn cancel(
        &mut self,
        actor: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionResult, DeployError> {
        let result = self.apply(Transition::Cancel, now)?;
        let message = format!("Cancelled by {actor}: {reason}");
        let output = match self.execution.output.take() {
            Some(previous) if !previous.is_empty() => format!("{previous}\n{message}"),
            _ => message,
        };
        self.complete(output, None, now);
        Ok(result)
    }

    fn complete(&mut self, output: String, exit_code: Option<i32>, now: DateTime<Utc>) {
        self.execution.output = Some(output);
        self.execution.exit_code = exit_code;
        self.execution.completed_at = Some(now);
        if let Some(started) = self.execution.started_at {
            let elapsed = (now - started).num_milliseconds().max(0);
            self.execution.duration_ms = Some(elapsed as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::TokenDigest;
    use crate::config::{AppConfig, ReleaseOptions, StrategyKind};
    use crate::deploy::record::{
        DeploymentAction, DeploymentSource, NewDeployment, PendingApproval, TriggerKind,
    };
    use crate::types::AppKey;
    use chrono::Duration;
    use std::path::PathBuf;

    fn app() -> AppConfig {
        AppConfig {
            key: AppKey::new("shop").unwrap(),
            name: "Shop".into(),
            repository: None,
            path: PathBuf::from("/srv/shop"),
            strategy: StrategyKind::Simple,
            releases: ReleaseOptions::default(),
            triggers: vec![],
            notifications: vec![],
        }
    }

    fn request() -> NewDeployment {
        NewDeployment {
            trigger_name: "production".into(),
            trigger_kind: TriggerKind::Release,
            git_ref: "v1.2.0".into(),
            repository: None,
            commit_sha: "abc1234".into(),
            commit_message: None,
            author: "dana".into(),
            delivery_id: None,
            payload: serde_json::Value::Null,
            action: DeploymentAction::Deploy,
            source: DeploymentSource::Webhook,
        }
    }

    fn pending(now: DateTime<Utc>) -> DeploymentRecord {
        let approval = PendingApproval {
            token_hash: TokenDigest::from_hex("00ff"),
            expires_at: now + Duration::hours(1),
        };
        DeploymentRecord::open(&app(), request(), Some(approval), now)
    }

    #[test]
    fn approve_moves_to_queued_and_records_actor() {
        let now = Utc::now();
        let mut record = pending(now);

        let result = record.approve("ops@example.com", now).unwrap();

        assert_eq!(result.from, DeploymentStatus::PendingApproval);
        assert_eq!(result.to, DeploymentStatus::Queued);
        assert_eq!(record.approval.approved_by.as_deref(), Some("ops@example.com"));
        assert_eq!(record.execution.queued_at, Some(now));
    }

    #[test]
    fn approve_after_expiry_leaves_record_pending() {
        let now = Utc::now();
        let mut record = pending(now);

        let err = record.approve("ops", now + Duration::hours(2)).unwrap_err();

        assert!(matches!(err, DeployError::Expired { .. }));
        assert_eq!(record.status, DeploymentStatus::PendingApproval);
        assert!(record.approval.approved_by.is_none());
    }

    #[test]
    fn reject_after_expiry_is_allowed() {
        let now = Utc::now();
        let mut record = pending(now);

        record.reject("ops", None, now + Duration::hours(2)).unwrap();

        assert_eq!(record.status, DeploymentStatus::Rejected);
        assert_eq!(
            record.approval.rejection_reason.as_deref(),
            Some(DEFAULT_REJECTION_REASON)
        );
    }

    #[test]
    fn expire_refuses_open_window() {
        let now = Utc::now();
        let mut record = pending(now);
        assert!(matches!(
            record.expire(now),
            Err(DeployError::NotExpired { .. })
        ));
        record.expire(now + Duration::hours(1) + Duration::seconds(1)).unwrap();
        assert_eq!(record.status, DeploymentStatus::Expired);
    }

    #[test]
    fn finish_records_duration_and_exit_code() {
        let now = Utc::now();
        let mut record = DeploymentRecord::open(&app(), request(), None, now);
        record.start("host:1", now).unwrap();

        record
            .finish(false, "boom".into(), 2, now + Duration::seconds(3))
            .unwrap();

        assert_eq!(record.status, DeploymentStatus::Failed);
        assert_eq!(record.execution.exit_code, Some(2));
        assert_eq!(record.execution.duration_ms, Some(3000));
    }

    #[test]
    fn illegal_transition_leaves_record_unchanged() {
        let now = Utc::now();
        let mut record = DeploymentRecord::open(&app(), request(), None, now);
        let before = record.clone();

        let err = record.reject("ops", Some("no"), now).unwrap_err();

        assert!(matches!(err, DeployError::WrongStatus { .. }));
        assert_eq!(record, before);
    }

    #[test]
    fn cancel_from_pending_fails_record() {
        let now = Utc::now();
        let mut record = pending(now);
        record.cancel("ops", "superseded", now).unwrap();
        assert_eq!(record.status, DeploymentStatus::Failed);
        assert_eq!(
            record.execution.output.as_deref(),
            Some("Cancelled by ops: superseded")
        );
        assert!(record.cancel("ops", "again", now).is_err());
    }
}
