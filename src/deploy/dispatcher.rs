// ABOUTME: Executes queued deployments: claim, run the strategy under a timeout, record the result.
// ABOUTME: One attempt per record; cancellation drops the in-flight run and its processes.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use super::error::DeployError;
use super::lock::{DeployLocks, LockInfo, guarded_triggers};
use super::record::{DeploymentAction, DeploymentRecord};
use super::status::{DeploymentStatus, Transition};
use super::transitions::{TIMEOUT_EXIT_CODE, UNSTARTED_EXIT_CODE};
use crate::config::{AppConfig, Settings};
use crate::hooks::Observers;
use crate::registry::AppRegistry;
use crate::store::{DeploymentStore, StoreError};
use crate::strategy::{DeployOutcome, StrategyRegistry};
use crate::types::{AppKey, DeploymentId};

/// Execution limits, passed in explicitly rather than read from globals.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Hard wall-clock limit per story run.
    pub timeout: Duration,
    /// Recorded as the executing worker.
    pub worker: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            worker: LockInfo::current().worker_id(),
        }
    }
}

impl DispatcherConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: settings.deploy_timeout,
            ..Self::default()
        }
    }
}

pub struct Dispatcher {
    apps: Arc<AppRegistry>,
    store: Arc<dyn DeploymentStore>,
    strategies: StrategyRegistry,
    locks: Arc<DeployLocks>,
    observers: Observers,
    config: DispatcherConfig,
    running: Mutex<HashMap<DeploymentId, Arc<Notify>>>,
}

enum Finished {
    Completed(Result<DeployOutcome, DeployError>),
    TimedOut,
    Cancelled,
}

/// Removes the cancellation handle when a dispatch ends, however it ends.
struct RunningEntry<'a> {
    dispatcher: &'a Dispatcher,
    id: DeploymentId,
}

impl Drop for RunningEntry<'_> {
    fn drop(&mut self) {
        self.dispatcher.running.lock().remove(&self.id);
    }
}

impl Dispatcher {
    pub fn new(
        apps: Arc<AppRegistry>,
        store: Arc<dyn DeploymentStore>,
        strategies: StrategyRegistry,
        locks: Arc<DeployLocks>,
        observers: Observers,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            apps,
            store,
            strategies,
            locks,
            observers,
            config,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Run a queued deployment to a terminal state and return the stored record.
    pub async fn dispatch(&self, id: DeploymentId) -> Result<DeploymentRecord, DeployError> {
        let cancel = Arc::new(Notify::new());
        self.running.lock().insert(id, cancel.clone());
        let _entry = RunningEntry {
            dispatcher: self,
            id,
        };

        let record = self.claim(id).await?;
        tracing::info!(
            deployment = %id.short(),
            app = %record.app_key,
            trigger = %record.trigger_name,
            worker = %self.config.worker,
            "deployment started"
        );

        let finished = tokio::select! {
            result = tokio::time::timeout(self.config.timeout, self.execute(&record)) => match result {
                Ok(result) => Finished::Completed(result),
                Err(_) => Finished::TimedOut,
            },
            _ = cancel.notified() => Finished::Cancelled,
        };

        self.finish(record, finished).await
    }

    /// Ask an in-flight dispatch to stop. Returns false when nothing is running.
    pub fn signal_cancel(&self, id: DeploymentId) -> bool {
        match self.running.lock().get(&id) {
            Some(notify) => {
                notify.notify_one();
                true
            }
            None => false,
        }
    }

    /// `queued -> running`, refusing when another record is active for the pair.
    async fn claim(&self, id: DeploymentId) -> Result<DeploymentRecord, DeployError> {
        let record = self.store.get(id).await?.ok_or(DeployError::NotFound)?;
        let app: &AppConfig = self.apps.resolve(record.app_key.as_str())?;
        let guarded = guarded_triggers(app, &record.trigger_name);
        let _lock = self.locks.acquire_all(&record.app_key, &guarded).await?;

        let mut record = self.store.get(id).await?.ok_or(DeployError::NotFound)?;
        if record.status != DeploymentStatus::Queued {
            return Err(DeployError::wrong_status(
                id,
                record.status,
                Transition::Start,
            ));
        }
        if let Some(other) =
            find_active_among(self.store.as_ref(), &record.app_key, &guarded, Some(id)).await?
        {
            return Err(DeployError::Conflict {
                active: other.id,
                app: record.app_key.to_string(),
                trigger: other.trigger_name,
            });
        }

        let result = record.start(&self.config.worker, Utc::now())?;
        self.store
            .update(&record, result.from)
            .await
            .map_err(|e| cas_error(e, Transition::Start))?;
        self.observers.notify(&record, Some(result.from));
        Ok(record)
    }

    async fn execute(&self, record: &DeploymentRecord) -> Result<DeployOutcome, DeployError> {
        let app: &AppConfig = self.apps.resolve(record.app_key.as_str())?;
        let deployer = self.strategies.for_app(app)?;
        match record.action {
            DeploymentAction::Deploy => deployer.deploy(app, record).await,
            DeploymentAction::Rollback { ref target } => {
                deployer.rollback(app, record, target).await
            }
        }
    }

    async fn finish(
        &self,
        mut record: DeploymentRecord,
        finished: Finished,
    ) -> Result<DeploymentRecord, DeployError> {
        let id = record.id;
        let outcome = match finished {
            Finished::Completed(Ok(outcome)) => outcome,
            Finished::Completed(Err(e)) => {
                tracing::error!(deployment = %id.short(), error = %e, "deployment errored");
                DeployOutcome::failed(e.to_string())
            }
            Finished::TimedOut => {
                tracing::error!(
                    deployment = %id.short(),
                    timeout_secs = self.config.timeout.as_secs(),
                    "deployment timed out"
                );
                DeployOutcome {
                    exit_code: TIMEOUT_EXIT_CODE,
                    ..DeployOutcome::failed(format!(
                        "Deployment timed out after {} seconds",
                        self.config.timeout.as_secs()
                    ))
                }
            }
            Finished::Cancelled => {
                tracing::warn!(deployment = %id.short(), "deployment cancelled while running");
                return self.store.get(id).await?.ok_or(DeployError::NotFound);
            }
        };

        if outcome.release.is_some() {
            record.release_name = outcome.release.clone();
            record.release_path = outcome.release_path.clone();
        }
        if !outcome.warnings.is_empty()
            && let Ok(warnings) = serde_json::to_value(&outcome.warnings)
        {
            record.metadata.insert("warnings".to_string(), warnings);
        }
        let exit_code = if outcome.success {
            outcome.exit_code
        } else if outcome.exit_code == 0 {
            UNSTARTED_EXIT_CODE
        } else {
            outcome.exit_code
        };

        let result = record.finish(outcome.success, outcome.output, exit_code, Utc::now())?;
        match self.store.update(&record, result.from).await {
            Ok(()) => {
                self.observers.notify(&record, Some(result.from));
                Ok(record)
            }
            Err(StoreError::StatusChanged { .. }) => {
                tracing::warn!(deployment = %id.short(), "record changed while running; keeping stored state");
                self.store.get(id).await?.ok_or(DeployError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Map a lost compare-and-swap to the status error callers expect.
pub(crate) fn cas_error(err: StoreError, action: Transition) -> DeployError {
    match err {
        StoreError::StatusChanged { id, actual, .. } => {
            DeployError::wrong_status(id, actual, action)
        }
        StoreError::NotFound(_) => DeployError::NotFound,
        other => DeployError::Store(other),
    }
}

/// First active record of `app` on any of `triggers`, other than `exclude`.
pub(crate) async fn find_active_among(
    store: &dyn DeploymentStore,
    app: &AppKey,
    triggers: &[&str],
    exclude: Option<DeploymentId>,
) -> Result<Option<DeploymentRecord>, StoreError> {
    for trigger in triggers {
        if let Some(active) = store
            .find_active(app, trigger)
            .await?
            .into_iter()
            .find(|r| Some(r.id) != exclude)
        {
            return Ok(Some(active));
        }
    }
    Ok(None)
}
