// ABOUTME: Release records of the advanced strategy and the selection rules over them.
// ABOUTME: Ordering always uses the per-app sequence number, never timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::deploy::{DeployError, RollbackTarget};
use crate::types::{AppKey, DeploymentId, ReleaseId, ReleaseName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub id: ReleaseId,
    pub app_key: AppKey,
    pub name: ReleaseName,
    pub path: PathBuf,
    pub commit_sha: String,
    pub deployment_id: DeploymentId,
    pub is_active: bool,
    pub size_bytes: Option<u64>,
    /// Assigned by the store; strictly increasing.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

/// A release about to be recorded as active.
#[derive(Debug, Clone)]
pub struct NewRelease {
    pub app_key: AppKey,
    pub name: ReleaseName,
    pub path: PathBuf,
    pub commit_sha: String,
    pub deployment_id: DeploymentId,
    pub size_bytes: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Inactive releases beyond the newest `keep`. The active release is never returned.
pub fn retention_candidates(releases: &[ReleaseRecord], keep: usize) -> Vec<&ReleaseRecord> {
    let keep = keep.max(1);
    let mut inactive: Vec<_> = releases.iter().filter(|r| !r.is_active).collect();
    inactive.sort_by(|a, b| b.sequence.cmp(&a.sequence));
    inactive.into_iter().skip(keep).collect()
}

/// Release a rollback should activate.
///
/// A named target must exist and not already be active. A step count picks
/// the n-th most recent non-active release.
pub fn rollback_candidate<'a>(
    app: &AppKey,
    releases: &'a [ReleaseRecord],
    target: &RollbackTarget,
) -> Result<&'a ReleaseRecord, DeployError> {
    match target {
        RollbackTarget::Release(name) => {
            let release = releases
                .iter()
                .find(|r| r.name.as_str() == name)
                .ok_or_else(|| DeployError::ReleaseNotFound {
                    app: app.to_string(),
                    release: name.clone(),
                })?;
            if release.is_active {
                return Err(DeployError::InvalidRollback(format!(
                    "release '{name}' is already active"
                )));
            }
            Ok(release)
        }
        RollbackTarget::Steps(_) => {
            let mut inactive: Vec<_> = releases.iter().filter(|r| !r.is_active).collect();
            inactive.sort_by(|a, b| b.sequence.cmp(&a.sequence));
            let index = target.steps() as usize - 1;
            inactive
                .get(index)
                .copied()
                .ok_or_else(|| DeployError::NoPreviousRelease(app.to_string()))
        }
    }
}
