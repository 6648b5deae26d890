// ABOUTME: Immutable-release strategy: each deploy builds a new directory under releases/.
// ABOUTME: Activation renames a symlink over `current`; rollback only re-activates.

use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::release::{retention_candidates, rollback_candidate};
use super::{
    DeployOutcome, Deployer, NewRelease, ReleaseFs, ReleaseInfo, activate, base_invocation,
    story_for,
};
use crate::config::{AppConfig, StrategyKind};
use crate::deploy::{DeployError, DeploymentRecord, RollbackTarget};
use crate::diagnostics::{Diagnostics, Warning};
use crate::runner::ProcessRunner;
use crate::store::ReleaseStore;
use crate::types::ReleaseName;

const RESERVE_ATTEMPTS: usize = 5;

pub struct AdvancedDeployer {
    runner: Arc<dyn ProcessRunner>,
    releases: Arc<dyn ReleaseStore>,
    fs: Arc<dyn ReleaseFs>,
}

impl AdvancedDeployer {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        releases: Arc<dyn ReleaseStore>,
        fs: Arc<dyn ReleaseFs>,
    ) -> Self {
        Self {
            runner,
            releases,
            fs,
        }
    }

    /// Replace each shared path in the release with a link into `shared/`.
    fn link_shared(&self, app: &AppConfig, release: &Path) -> std::io::Result<()> {
        let shared = app.shared_path();
        self.fs.create_dir_all(&shared)?;

        for dir in &app.releases.shared_dirs {
            let target = shared.join(dir);
            self.fs.create_dir_all(&target)?;
            self.link_into(&target, &release.join(dir))?;
        }
        for file in &app.releases.shared_files {
            let target = shared.join(file);
            if let Some(parent) = target.parent() {
                self.fs.create_dir_all(parent)?;
            }
            if !self.fs.exists(&target) {
                self.fs.touch(&target)?;
            }
            self.link_into(&target, &release.join(file))?;
        }
        Ok(())
    }

    fn link_into(&self, target: &Path, link: &Path) -> std::io::Result<()> {
        self.fs.remove_path(link)?;
        if let Some(parent) = link.parent() {
            self.fs.create_dir_all(parent)?;
        }
        self.fs.symlink(target, link)
    }

    /// Create a fresh release directory, never reusing an existing one.
    fn reserve_release(
        &self,
        app: &AppConfig,
        commit_sha: &str,
    ) -> Result<(ReleaseName, PathBuf), DeployError> {
        let releases_path = app.releases_path();
        self.fs.create_dir_all(&releases_path).map_err(|e| {
            DeployError::Execution(format!(
                "failed to create releases directory {}: {e}",
                releases_path.display()
            ))
        })?;

        for _ in 0..RESERVE_ATTEMPTS {
            let name = ReleaseName::generate(Utc::now(), commit_sha);
            let release_path = app.release_path(&name);
            match self.fs.create_dir(&release_path) {
                Ok(()) => return Ok((name, release_path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!(release = %name, "release name taken, generating another");
                }
                Err(e) => {
                    return Err(DeployError::Execution(format!(
                        "failed to create release directory {}: {e}",
                        release_path.display()
                    )));
                }
            }
        }
        Err(DeployError::Execution(format!(
            "no free release name for {} after {RESERVE_ATTEMPTS} attempts",
            app.key
        )))
    }

    /// Remove a release that never went live.
    fn discard(&self, release: &Path) {
        if let Err(e) = self.fs.remove_path(release) {
            tracing::warn!(release = %release.display(), error = %e, "failed to remove unfinished release");
        }
    }

    async fn measure(&self, release: &Path, diag: &mut Diagnostics) -> Option<u64> {
        let fs = self.fs.clone();
        let path = release.to_path_buf();
        match tokio::task::spawn_blocking(move || fs.dir_size(&path)).await {
            Ok(Ok(size)) => Some(size),
            Ok(Err(e)) => {
                diag.warn(Warning::release_size(format!(
                    "could not measure {}: {e}",
                    release.display()
                )));
                None
            }
            Err(e) => {
                diag.warn(Warning::release_size(format!("size task failed: {e}")));
                None
            }
        }
    }

    /// Drop inactive releases beyond the retention count, oldest first.
    async fn cleanup(&self, app: &AppConfig, diag: &mut Diagnostics) -> Result<(), DeployError> {
        let releases = self.releases.list_releases(&app.key).await?;
        let doomed: Vec<_> = retention_candidates(&releases, app.releases.effective_keep())
            .into_iter()
            .cloned()
            .collect();

        for release in doomed {
            if let Err(e) = self.fs.remove_path(&release.path) {
                diag.warn(Warning::release_cleanup(format!(
                    "failed to remove release {}: {e}",
                    release.name
                )));
                continue;
            }
            self.releases.delete_release(&app.key, &release.name).await?;
            tracing::info!(app = %app.key, release = %release.name, "removed old release");
        }
        Ok(())
    }
}

fn report_leftover(leftover: Option<(PathBuf, std::io::Error)>, diag: &mut Diagnostics) {
    if let Some((path, e)) = leftover {
        diag.warn(Warning::activation_leftover(format!(
            "could not remove staging link {}: {e}",
            path.display()
        )));
    }
}

#[async_trait]
impl Deployer for AdvancedDeployer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Advanced
    }

    async fn deploy(
        &self,
        app: &AppConfig,
        record: &DeploymentRecord,
    ) -> Result<DeployOutcome, DeployError> {
        let story = story_for(app, record)?;
        let (name, release_path) = self.reserve_release(app, &record.commit_sha)?;
        let current = app.current_path();

        let invocation = base_invocation(&story, app, record)
            .param("release", name.as_str())
            .param("release_path", release_path.display().to_string())
            .param("shared_path", app.shared_path().display().to_string())
            .param("current_path", current.display().to_string());

        let run = match self.runner.run(&invocation).await {
            Ok(run) => run,
            Err(e) => {
                self.discard(&release_path);
                return Ok(DeployOutcome::not_started(&e));
            }
        };
        if !run.success() {
            self.discard(&release_path);
            return Ok(DeployOutcome::from_run(&run));
        }

        let mut output = run.combined();
        if let Err(e) = self.link_shared(app, &release_path) {
            self.discard(&release_path);
            output.push_str(&format!("\nfailed to link shared paths: {e}"));
            return Ok(DeployOutcome::failed(output));
        }
        let mut diag = Diagnostics::default();
        if let Err(e) = activate(self.fs.as_ref(), &release_path, &current) {
            self.discard(&release_path);
            output.push_str(&format!("\nactivation failed: {e}"));
            report_leftover(e.leftover, &mut diag);
            return Ok(DeployOutcome {
                warnings: diag.into_warnings(),
                ..DeployOutcome::failed(output)
            });
        }
        tracing::info!(app = %app.key, release = %name, "release activated");

        // The release is live from here on; bookkeeping failures only warn.
        let size_bytes = self.measure(&release_path, &mut diag).await;
        let recorded = self
            .releases
            .insert_release(NewRelease {
                app_key: app.key.clone(),
                name: name.clone(),
                path: release_path.clone(),
                commit_sha: record.commit_sha.clone(),
                deployment_id: record.id,
                size_bytes,
                created_at: Utc::now(),
            })
            .await;
        match recorded {
            Ok(_) => {
                if let Err(e) = self.cleanup(app, &mut diag).await {
                    diag.warn(Warning::release_cleanup(format!(
                        "retention cleanup failed: {e}"
                    )));
                }
            }
            Err(e) => diag.warn(Warning::release_record(format!(
                "release {name} is live but was not recorded: {e}"
            ))),
        }

        Ok(DeployOutcome {
            warnings: diag.into_warnings(),
            ..DeployOutcome::from_run(&run).with_release(name, release_path)
        })
    }

    async fn rollback(
        &self,
        app: &AppConfig,
        _record: &DeploymentRecord,
        target: &RollbackTarget,
    ) -> Result<DeployOutcome, DeployError> {
        let releases = self.releases.list_releases(&app.key).await?;
        let previous = releases.iter().find(|r| r.is_active).map(|r| r.name.clone());
        let chosen = rollback_candidate(&app.key, &releases, target)?.clone();

        if !self.fs.exists(&chosen.path) {
            return Ok(DeployOutcome::failed(format!(
                "release directory {} is missing",
                chosen.path.display()
            )));
        }
        if let Err(e) = activate(self.fs.as_ref(), &chosen.path, &app.current_path()) {
            let mut diag = Diagnostics::default();
            report_leftover(e.leftover, &mut diag);
            return Ok(DeployOutcome {
                warnings: diag.into_warnings(),
                ..DeployOutcome::failed(format!("activation failed: {}", e.source))
            });
        }
        self.releases.activate_release(&app.key, &chosen.name).await?;

        let output = match previous {
            Some(previous) => format!("Activated release {} (was {previous})", chosen.name),
            None => format!("Activated release {}", chosen.name),
        };
        tracing::info!(app = %app.key, release = %chosen.name, "rolled back");

        Ok(DeployOutcome {
            success: true,
            output,
            exit_code: 0,
            ..DeployOutcome::default()
        }
        .with_release(chosen.name, chosen.path))
    }

    async fn list_releases(&self, app: &AppConfig) -> Result<Vec<ReleaseInfo>, DeployError> {
        let releases = self.releases.list_releases(&app.key).await?;
        Ok(releases
            .into_iter()
            .rev()
            .map(|r| ReleaseInfo {
                name: r.name.to_string(),
                commit_sha: Some(r.commit_sha),
                created_at: Some(r.created_at),
                summary: None,
                path: Some(r.path),
                active: r.is_active,
                size_bytes: r.size_bytes,
            })
            .collect())
    }
}
