// ABOUTME: Release strategies: in-place `simple` and symlink-activated `advanced`.
// ABOUTME: The registry hands each app the deployer matching its configured strategy.

mod advanced;
mod fs;
mod release;
mod simple;

pub use advanced::AdvancedDeployer;
pub use fs::{ActivationError, LocalFs, ReleaseFs, activate};
pub use release::{NewRelease, ReleaseRecord, retention_candidates, rollback_candidate};
pub use simple::{HISTORY_STORY, ROLLBACK_STORY, SimpleDeployer, parse_history};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, StrategyKind};
use crate::deploy::{DeployError, DeploymentRecord, RollbackTarget, UNSTARTED_EXIT_CODE};
use crate::diagnostics::Warning;
use crate::runner::{ProcessRunner, RunOutput, RunnerError, StoryInvocation};
use crate::store::ReleaseStore;
use crate::types::ReleaseName;

/// What a strategy reports back to the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct DeployOutcome {
    pub success: bool,
    /// Combined stdout and stderr.
    pub output: String,
    pub exit_code: i32,
    pub release: Option<ReleaseName>,
    pub release_path: Option<PathBuf>,
    pub warnings: Vec<Warning>,
}

impl DeployOutcome {
    pub fn from_run(run: &RunOutput) -> Self {
        Self {
            success: run.success(),
            output: run.combined(),
            exit_code: run.exit_code,
            ..Self::default()
        }
    }

    /// The process never ran.
    pub fn not_started(err: &RunnerError) -> Self {
        Self::failed(err.to_string())
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            exit_code: UNSTARTED_EXIT_CODE,
            ..Self::default()
        }
    }

    pub fn with_release(mut self, name: ReleaseName, path: PathBuf) -> Self {
        self.release = Some(name);
        self.release_path = Some(path);
        self
    }
}

/// A release as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub commit_sha: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub path: Option<PathBuf>,
    pub active: bool,
    pub size_bytes: Option<u64>,
}

#[async_trait]
pub trait Deployer: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn deploy(
        &self,
        app: &AppConfig,
        record: &DeploymentRecord,
    ) -> Result<DeployOutcome, DeployError>;

    async fn rollback(
        &self,
        app: &AppConfig,
        record: &DeploymentRecord,
        target: &RollbackTarget,
    ) -> Result<DeployOutcome, DeployError>;

    /// Newest first.
    async fn list_releases(&self, app: &AppConfig) -> Result<Vec<ReleaseInfo>, DeployError>;
}

/// Deployers keyed by strategy.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    deployers: HashMap<StrategyKind, Arc<dyn Deployer>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("kinds", &self.deployers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both built-in strategies over the given runner and release store.
    pub fn standard(runner: Arc<dyn ProcessRunner>, releases: Arc<dyn ReleaseStore>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SimpleDeployer::new(runner.clone())));
        registry.register(Arc::new(AdvancedDeployer::new(
            runner,
            releases,
            Arc::new(LocalFs),
        )));
        registry
    }

    pub fn register(&mut self, deployer: Arc<dyn Deployer>) {
        self.deployers.insert(deployer.kind(), deployer);
    }

    pub fn for_app(&self, app: &AppConfig) -> Result<Arc<dyn Deployer>, DeployError> {
        self.deployers.get(&app.strategy).cloned().ok_or_else(|| {
            DeployError::Execution(format!("no deployer registered for strategy {}", app.strategy))
        })
    }
}

/// The story configured for the record's trigger.
pub(crate) fn story_for(app: &AppConfig, record: &DeploymentRecord) -> Result<String, DeployError> {
    app.trigger(&record.trigger_name)
        .map(|t| t.story.clone())
        .ok_or_else(|| DeployError::TriggerNotFound {
            app: app.key.to_string(),
            trigger: record.trigger_name.clone(),
        })
}

/// Parameters every story receives.
pub(crate) fn base_invocation(
    story: &str,
    app: &AppConfig,
    record: &DeploymentRecord,
) -> StoryInvocation {
    StoryInvocation::new(story)
        .param("app", app.key.as_str())
        .param("app_name", &app.name)
        .param("app_path", app.path.display().to_string())
        .param("strategy", app.strategy.as_str())
        .param("deployment_id", record.id.to_string())
        .param("trigger", &record.trigger_name)
        .param("ref", &record.trigger_ref)
        .param("commit", &record.commit_sha)
        .param("author", &record.author)
        .working_dir(&app.path)
}
