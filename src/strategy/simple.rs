// ABOUTME: In-place strategy: the trigger's story updates the app root directly.
// ABOUTME: History and rollback are stories too, so the host decides what a release is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{DeployOutcome, Deployer, ReleaseInfo, base_invocation, story_for};
use crate::config::{AppConfig, StrategyKind};
use crate::deploy::{DeployError, DeploymentRecord, RollbackTarget};
use crate::runner::{ProcessRunner, StoryInvocation};

/// Story run for simple rollbacks.
pub const ROLLBACK_STORY: &str = "rollback";

/// Story that prints `sha|timestamp|subject` lines, newest first.
pub const HISTORY_STORY: &str = "history";

const HISTORY_LIMIT: usize = 10;

pub struct SimpleDeployer {
    runner: Arc<dyn ProcessRunner>,
}

impl SimpleDeployer {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Deployer for SimpleDeployer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Simple
    }

    async fn deploy(
        &self,
        app: &AppConfig,
        record: &DeploymentRecord,
    ) -> Result<DeployOutcome, DeployError> {
        let story = story_for(app, record)?;
        let invocation = base_invocation(&story, app, record);

        match self.runner.run(&invocation).await {
            Ok(run) => Ok(DeployOutcome::from_run(&run)),
            Err(e) => Ok(DeployOutcome::not_started(&e)),
        }
    }

    async fn rollback(
        &self,
        app: &AppConfig,
        record: &DeploymentRecord,
        target: &RollbackTarget,
    ) -> Result<DeployOutcome, DeployError> {
        let target_ref = match target {
            RollbackTarget::Release(git_ref) => git_ref.clone(),
            RollbackTarget::Steps(_) => format!("HEAD~{}", target.steps()),
        };
        let invocation =
            base_invocation(ROLLBACK_STORY, app, record).param("target_ref", target_ref);

        match self.runner.run(&invocation).await {
            Ok(run) => Ok(DeployOutcome::from_run(&run)),
            Err(e) => Ok(DeployOutcome::not_started(&e)),
        }
    }

    async fn list_releases(&self, app: &AppConfig) -> Result<Vec<ReleaseInfo>, DeployError> {
        let invocation = StoryInvocation::new(HISTORY_STORY)
            .param("app", app.key.as_str())
            .param("app_path", app.path.display().to_string())
            .param("limit", HISTORY_LIMIT.to_string())
            .working_dir(&app.path);

        let run = self.runner.run(&invocation).await?;
        if !run.success() {
            return Err(DeployError::Execution(format!(
                "history story exited with {}: {}",
                run.exit_code,
                run.combined().trim()
            )));
        }

        Ok(parse_history(&run.stdout, app))
    }
}

/// Parse `sha|timestamp|subject` lines. The first entry is the live one.
pub fn parse_history(stdout: &str, app: &AppConfig) -> Vec<ReleaseInfo> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(HISTORY_LIMIT)
        .enumerate()
        .map(|(i, line)| {
            let mut parts = line.splitn(3, '|');
            let sha = parts.next().unwrap_or_default().trim().to_string();
            let created_at = parts
                .next()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts.trim()).ok())
                .map(|ts| ts.with_timezone(&Utc));
            let summary = parts
                .next()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            ReleaseInfo {
                name: sha.chars().take(7).collect(),
                commit_sha: Some(sha),
                created_at,
                summary,
                path: Some(app.path.clone()),
                active: i == 0,
                size_bytes: None,
            }
        })
        .collect()
}
