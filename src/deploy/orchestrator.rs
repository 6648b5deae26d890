// ABOUTME: Orchestrator service: event intake, approvals, expiry, cancel, rollback, and queries.
// ABOUTME: Every record write is a compare-and-swap against the status it was read in.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::dispatcher::{Dispatcher, DispatcherConfig, cas_error, find_active_among};
use super::error::{DeployError, DeployErrorKind};
use super::lock::{DeployLocks, guarded_triggers};
use super::record::{
    DeploymentAction, DeploymentRecord, DeploymentSource, NewDeployment, PendingApproval,
    ROLLBACK_TRIGGER, RollbackTarget, TriggerKind, idempotency_key,
};
use super::status::Transition;
use crate::approval::{Actor, ApprovalToken, TOKEN_LENGTH, TokenDigester, token_prefix};
use crate::config::{AppConfig, ApprovalPolicy, StrategyKind};
use crate::hooks::Observers;
use crate::registry::{AppRegistry, SourceEvent};
use crate::store::{DeploymentFilter, DeploymentStore, ReleaseStore, StoreError};
use crate::strategy::{ReleaseInfo, StrategyRegistry, rollback_candidate};
use crate::types::{AppKey, DeploymentId, RepositoryIdentity};

/// A freshly created record and, when approval is required, its token.
///
/// The token is handed out exactly once; only its digest is stored.
#[derive(Debug)]
pub struct CreatedDeployment {
    pub record: DeploymentRecord,
    pub approval: Option<ApprovalToken>,
}

/// Result for one (app, trigger) pair selected by an event.
#[derive(Debug)]
pub enum TriggerOutcome {
    Created(CreatedDeployment),
    /// The delivery was processed before; this is the existing record.
    Duplicate(DeploymentRecord),
    /// Creation was refused, typically by an active deployment.
    Refused {
        app: AppKey,
        trigger: String,
        error: DeployError,
    },
}

/// Operator request for a deployment outside of webhooks.
#[derive(Debug, Clone, Default)]
pub struct ManualDeployment {
    pub git_ref: String,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
}

pub struct Orchestrator {
    apps: Arc<AppRegistry>,
    store: Arc<dyn DeploymentStore>,
    releases: Arc<dyn ReleaseStore>,
    digester: Option<TokenDigester>,
    locks: Arc<DeployLocks>,
    strategies: StrategyRegistry,
    observers: Observers,
    dispatcher: Dispatcher,
}

pub struct OrchestratorBuilder {
    apps: Arc<AppRegistry>,
    store: Arc<dyn DeploymentStore>,
    releases: Arc<dyn ReleaseStore>,
    strategies: StrategyRegistry,
    digester: Option<TokenDigester>,
    observers: Observers,
    config: DispatcherConfig,
    lock_dir: Option<PathBuf>,
}

impl OrchestratorBuilder {
    pub fn digester(mut self, digester: TokenDigester) -> Self {
        self.digester = Some(digester);
        self
    }

    pub fn observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    pub fn dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Share deploy locks with other processes through lock files in `dir`.
    pub fn lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Orchestrator {
        let locks = Arc::new(match self.lock_dir {
            Some(dir) => DeployLocks::with_dir(dir),
            None => DeployLocks::new(),
        });
        let dispatcher = Dispatcher::new(
            self.apps.clone(),
            self.store.clone(),
            self.strategies.clone(),
            locks.clone(),
            self.observers.clone(),
            self.config,
        );
        Orchestrator {
            apps: self.apps,
            store: self.store,
            releases: self.releases,
            digester: self.digester,
            locks,
            strategies: self.strategies,
            observers: self.observers,
            dispatcher,
        }
    }
}

impl Orchestrator {
    pub fn builder(
        apps: Arc<AppRegistry>,
        store: Arc<dyn DeploymentStore>,
        releases: Arc<dyn ReleaseStore>,
        strategies: StrategyRegistry,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            apps,
            store,
            releases,
            strategies,
            digester: None,
            observers: Observers::default(),
            config: DispatcherConfig::default(),
            lock_dir: None,
        }
    }

    pub fn apps(&self) -> &AppRegistry {
        &self.apps
    }

    /// Create one record per (app, trigger) the event selects.
    pub async fn handle_event(&self, event: SourceEvent) -> Result<Vec<TriggerOutcome>, DeployError> {
        if let Some(ref delivery) = event.delivery_id {
            let seen = self.store.find_by_delivery_id(delivery).await?;
            if !seen.is_empty() {
                tracing::info!(delivery, records = seen.len(), "duplicate delivery ignored");
                return Ok(seen
                    .into_iter()
                    .map(|r| TriggerOutcome::Duplicate(r.redacted()))
                    .collect());
            }
        }

        let matches =
            self.apps
                .find_matching_triggers(event.kind, &event.git_ref, event.repository.as_deref());
        if matches.is_empty() {
            tracing::debug!(kind = %event.kind, git_ref = %event.git_ref, "event matched no trigger");
        }

        let repository = event
            .repository
            .as_deref()
            .and_then(RepositoryIdentity::parse)
            .map(|r| r.to_string());

        let mut outcomes = Vec::with_capacity(matches.len());
        for matched in matches {
            let request = NewDeployment {
                trigger_name: matched.trigger.name.clone(),
                trigger_kind: event.kind.into(),
                git_ref: event.git_ref.clone(),
                repository: repository.clone(),
                commit_sha: event.commit_sha.clone(),
                commit_message: event.commit_message.clone(),
                author: event.author.clone(),
                delivery_id: event.delivery_id.clone(),
                payload: event.payload.clone(),
                action: DeploymentAction::Deploy,
                source: DeploymentSource::Webhook,
            };

            match self.create(matched.app, matched.trigger.approval, request).await {
                Ok(created) => outcomes.push(TriggerOutcome::Created(created)),
                Err(DeployError::Duplicate(delivery)) => {
                    let key = idempotency_key(&delivery, &matched.app.key, &matched.trigger.name);
                    if let Some(existing) = self
                        .store
                        .find_by_delivery_id(&delivery)
                        .await?
                        .into_iter()
                        .find(|r| r.idempotency_key.as_deref() == Some(key.as_str()))
                    {
                        outcomes.push(TriggerOutcome::Duplicate(existing.redacted()));
                    }
                }
                Err(e) if e.kind() == DeployErrorKind::Conflict => {
                    tracing::warn!(app = %matched.app.key, trigger = %matched.trigger.name, error = %e, "deployment refused");
                    outcomes.push(TriggerOutcome::Refused {
                        app: matched.app.key.clone(),
                        trigger: matched.trigger.name.clone(),
                        error: e,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcomes)
    }

    /// Operator-requested deployment of `git_ref` through `trigger`'s policy.
    pub async fn create_deployment(
        &self,
        app_key: &str,
        trigger: &str,
        request: ManualDeployment,
        actor: &Actor,
    ) -> Result<CreatedDeployment, DeployError> {
        let app = self.apps.resolve(app_key)?;
        let trigger = app
            .trigger(trigger)
            .ok_or_else(|| DeployError::TriggerNotFound {
                app: app_key.to_string(),
                trigger: trigger.to_string(),
            })?;

        let new = NewDeployment {
            trigger_name: trigger.name.clone(),
            trigger_kind: trigger.event.into(),
            git_ref: request.git_ref,
            repository: app.repository.as_ref().map(|r| r.to_string()),
            commit_sha: request.commit_sha.unwrap_or_default(),
            commit_message: request.commit_message,
            author: actor.identity(),
            delivery_id: None,
            payload: serde_json::Value::Null,
            action: DeploymentAction::Deploy,
            source: DeploymentSource::Operator,
        };
        self.create(app, trigger.approval, new).await
    }

    async fn create(
        &self,
        app: &AppConfig,
        policy: ApprovalPolicy,
        request: NewDeployment,
    ) -> Result<CreatedDeployment, DeployError> {
        let guarded = guarded_triggers(app, &request.trigger_name);
        let _lock = self.locks.acquire_all(&app.key, &guarded).await?;

        if let Some(ref delivery) = request.delivery_id {
            let key = idempotency_key(delivery, &app.key, &request.trigger_name);
            let seen = self.store.find_by_delivery_id(delivery).await?;
            if seen
                .iter()
                .any(|r| r.idempotency_key.as_deref() == Some(key.as_str()))
            {
                return Err(DeployError::Duplicate(delivery.clone()));
            }
        }

        if let Some(active) =
            find_active_among(self.store.as_ref(), &app.key, &guarded, None).await?
        {
            return Err(DeployError::Conflict {
                active: active.id,
                app: app.key.to_string(),
                trigger: active.trigger_name,
            });
        }

        let now = Utc::now();
        let (token, pending) = if policy.required {
            let digester = self
                .digester
                .as_ref()
                .ok_or(DeployError::ApprovalUnavailable)?;
            let expires_at = chrono::Duration::from_std(policy.timeout)
                .ok()
                .and_then(|window| now.checked_add_signed(window))
                .ok_or_else(|| {
                    DeployError::Execution("approval timeout out of range".to_string())
                })?;
            let (token, token_hash) = digester.mint();
            (
                Some(token),
                Some(PendingApproval {
                    token_hash,
                    expires_at,
                }),
            )
        } else {
            (None, None)
        };

        let delivery = request.delivery_id.clone();
        let record = DeploymentRecord::open(app, request, pending, now);
        match self.store.insert(&record).await {
            Ok(()) => {}
            Err(StoreError::DuplicateDelivery(_)) => {
                return Err(DeployError::Duplicate(delivery.unwrap_or_default()));
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(ref token) = token {
            tracing::info!(
                deployment = %record.id.short(),
                token_prefix = token.prefix(),
                expires_at = ?record.approval.expires_at,
                "deployment awaiting approval"
            );
        }
        self.observers.notify(&record, None);

        Ok(CreatedDeployment {
            record: record.redacted(),
            approval: token,
        })
    }

    /// Resolve a presented token to its pending record.
    async fn find_by_token(&self, token: &str) -> Result<DeploymentRecord, DeployError> {
        let digester = self
            .digester
            .as_ref()
            .ok_or(DeployError::ApprovalUnavailable)?;

        if token.len() != TOKEN_LENGTH {
            tracing::warn!(token_prefix = token_prefix(token), "approval token has wrong length");
            return Err(DeployError::NotFound);
        }

        let digest = digester.digest(token);
        let Some(record) = self.store.find_by_token_hash(&digest).await? else {
            tracing::warn!(token_prefix = token_prefix(token), "unknown approval token");
            return Err(DeployError::NotFound);
        };
        let verified = record
            .approval
            .token_hash
            .as_ref()
            .is_some_and(|stored| digester.verify(token, stored));
        if !verified {
            tracing::warn!(token_prefix = token_prefix(token), "approval token mismatch");
            return Err(DeployError::NotFound);
        }
        Ok(record)
    }

    /// `pending_approval -> queued`. The caller decides when to dispatch.
    pub async fn approve(&self, token: &str, actor: &Actor) -> Result<DeploymentRecord, DeployError> {
        let mut record = self.find_by_token(token).await?;
        let result = record.approve(&actor.identity(), Utc::now())?;
        self.store
            .update(&record, result.from)
            .await
            .map_err(|e| cas_error(e, Transition::Approve))?;
        self.observers.notify(&record, Some(result.from));
        Ok(record.redacted())
    }

    pub async fn reject(
        &self,
        token: &str,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<DeploymentRecord, DeployError> {
        let mut record = self.find_by_token(token).await?;
        let result = record.reject(&actor.identity(), reason, Utc::now())?;
        self.store
            .update(&record, result.from)
            .await
            .map_err(|e| cas_error(e, Transition::Reject))?;
        self.observers.notify(&record, Some(result.from));
        Ok(record.redacted())
    }

    /// Expire every pending approval past its window. Safe to run repeatedly.
    pub async fn expire_stale(&self) -> Result<Vec<DeploymentRecord>, DeployError> {
        let now = Utc::now();
        let mut expired = Vec::new();

        for mut record in self.store.find_expired(now).await? {
            let Ok(result) = record.expire(now) else {
                continue;
            };
            match self.store.update(&record, result.from).await {
                Ok(()) => {
                    self.observers.notify(&record, Some(result.from));
                    expired.push(record.redacted());
                }
                Err(StoreError::StatusChanged { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired pending approvals");
        }
        Ok(expired)
    }

    /// Fail an active record. A running story is signalled and killed.
    pub async fn cancel(
        &self,
        id: DeploymentId,
        actor: &Actor,
        reason: &str,
    ) -> Result<DeploymentRecord, DeployError> {
        let mut record = self.store.get(id).await?.ok_or(DeployError::NotFound)?;
        let result = record.cancel(&actor.identity(), reason, Utc::now())?;
        self.store
            .update(&record, result.from)
            .await
            .map_err(|e| cas_error(e, Transition::Cancel))?;

        if self.dispatcher.signal_cancel(id) {
            tracing::info!(deployment = %id.short(), "signalled running deployment");
        }
        self.observers.notify(&record, Some(result.from));
        Ok(record.redacted())
    }

    /// Queue a rollback for `app_key`. Advanced apps must have a target release.
    pub async fn rollback(
        &self,
        app_key: &str,
        target: RollbackTarget,
        actor: &Actor,
    ) -> Result<CreatedDeployment, DeployError> {
        let app = self.apps.resolve(app_key)?;

        let mut commit_sha = String::new();
        if app.strategy == StrategyKind::Advanced {
            let releases = self.releases.list_releases(&app.key).await?;
            let chosen = rollback_candidate(&app.key, &releases, &target)?;
            commit_sha = chosen.commit_sha.clone();
        }

        let request = NewDeployment {
            trigger_name: ROLLBACK_TRIGGER.to_string(),
            trigger_kind: TriggerKind::Rollback,
            git_ref: target.to_string(),
            repository: app.repository.as_ref().map(|r| r.to_string()),
            commit_sha,
            commit_message: None,
            author: actor.identity(),
            delivery_id: None,
            payload: serde_json::Value::Null,
            action: DeploymentAction::Rollback { target },
            source: DeploymentSource::Operator,
        };
        let no_approval = ApprovalPolicy {
            required: false,
            timeout: std::time::Duration::ZERO,
        };
        self.create(app, no_approval, request).await
    }

    /// Run a queued record to completion.
    pub async fn dispatch(&self, id: DeploymentId) -> Result<DeploymentRecord, DeployError> {
        self.dispatcher.dispatch(id).await.map(|r| r.redacted())
    }

    /// Dispatch in the background. Failures are logged, never returned.
    pub fn spawn_dispatch(self: &Arc<Self>, id: DeploymentId) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.dispatch(id).await {
                tracing::error!(deployment = %id.short(), error = %e, "background dispatch failed");
            }
        })
    }

    /// Record by id with the token digest removed.
    pub async fn status(&self, id: DeploymentId) -> Result<DeploymentRecord, DeployError> {
        self.store
            .get(id)
            .await?
            .map(|r| r.redacted())
            .ok_or(DeployError::NotFound)
    }

    pub async fn list(&self, filter: &DeploymentFilter) -> Result<Vec<DeploymentRecord>, DeployError> {
        Ok(self
            .store
            .list(filter)
            .await?
            .into_iter()
            .map(|r| r.redacted())
            .collect())
    }

    pub async fn releases(&self, app_key: &str) -> Result<Vec<ReleaseInfo>, DeployError> {
        let app = self.apps.resolve(app_key)?;
        self.strategies.for_app(app)?.list_releases(app).await
    }
}
