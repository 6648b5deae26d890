// ABOUTME: In-memory store for deployments and releases, optionally backed by a JSON file.
// ABOUTME: File writes go to a temporary sibling and are renamed into place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{DeploymentFilter, DeploymentStore, ReleaseStore, StoreError};
use crate::approval::TokenDigest;
use crate::deploy::{DeploymentRecord, DeploymentStatus, LockFile};
use crate::strategy::{NewRelease, ReleaseRecord};
use crate::types::{AppKey, DeploymentId, ReleaseId, ReleaseName};

const STORE_LOCK_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    deployments: Vec<DeploymentRecord>,
    #[serde(default)]
    releases: Vec<ReleaseRecord>,
    #[serde(default)]
    next_release_sequence: u64,
}

impl StoreState {
    fn deployment_mut(&mut self, id: DeploymentId) -> Option<&mut DeploymentRecord> {
        self.deployments.iter_mut().find(|r| r.id == id)
    }

    fn set_active(&mut self, app: &AppKey, name: &ReleaseName) -> Option<ReleaseRecord> {
        if !self
            .releases
            .iter()
            .any(|r| &r.app_key == app && &r.name == name)
        {
            return None;
        }
        let mut activated = None;
        for release in self.releases.iter_mut().filter(|r| &r.app_key == app) {
            release.is_active = &release.name == name;
            if release.is_active {
                activated = Some(release.clone());
            }
        }
        activated
    }
}

/// Store kept in memory. With a path, every operation re-reads the file
/// first and every mutation is flushed back to it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a file-backed store, starting empty when the file does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let store = Self {
            state: RwLock::new(StoreState::default()),
            path: Some(path.to_path_buf()),
        };
        *store.state.write() = store.load()?;
        Ok(store)
    }

    fn load(&self) -> Result<StoreState, StoreError> {
        let Some(ref path) = self.path else {
            return Ok(StoreState::default());
        };
        if !path.exists() {
            return Ok(StoreState::default());
        }
        let load_err = |reason: String| StoreError::Load {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| load_err(e.to_string()))
    }

    fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let persist_err = |reason: String| StoreError::Persist {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| persist_err(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(state).map_err(|e| persist_err(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| persist_err(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| persist_err(e.to_string()))?;
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T, StoreError> {
        if self.path.is_some() {
            let mut state = self.state.write();
            *state = self.load()?;
            return Ok(f(&state));
        }
        Ok(f(&self.state.read()))
    }

    /// Take the state file's lock so other processes cannot interleave a write.
    fn lock_file(&self) -> Result<Option<LockFile>, StoreError> {
        let Some(ref path) = self.path else {
            return Ok(None);
        };
        let mut name = path.as_os_str().to_owned();
        name.push(".lock");
        let lock_path = PathBuf::from(name);

        match LockFile::acquire_blocking(&lock_path, STORE_LOCK_WAIT) {
            Ok(Ok(lock)) => Ok(Some(lock)),
            Ok(Err(holder)) => Err(StoreError::Locked {
                path: lock_path.display().to_string(),
                holder: holder.worker_id(),
            }),
            Err(e) => Err(StoreError::Persist {
                path: lock_path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Apply `f`; the state is persisted only when `f` succeeds.
    fn write<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.state.write();
        let _file_lock = self.lock_file()?;
        if self.path.is_some() {
            *state = self.load()?;
        }
        let value = f(&mut state)?;
        self.persist(&state)?;
        Ok(value)
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn insert(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        self.write(|state| {
            if state.deployments.iter().any(|r| r.id == record.id) {
                return Err(StoreError::DuplicateId(record.id));
            }
            if let Some(ref key) = record.idempotency_key
                && state
                    .deployments
                    .iter()
                    .any(|r| r.idempotency_key.as_ref() == Some(key))
            {
                return Err(StoreError::DuplicateDelivery(key.clone()));
            }
            state.deployments.push(record.clone());
            Ok(())
        })
    }

    async fn update(
        &self,
        record: &DeploymentRecord,
        expected: DeploymentStatus,
    ) -> Result<(), StoreError> {
        self.write(|state| {
            let stored = state
                .deployment_mut(record.id)
                .ok_or(StoreError::NotFound(record.id))?;
            if stored.status != expected {
                return Err(StoreError::StatusChanged {
                    id: record.id,
                    expected,
                    actual: stored.status,
                });
            }
            *stored = record.clone();
            Ok(())
        })
    }

    async fn get(&self, id: DeploymentId) -> Result<Option<DeploymentRecord>, StoreError> {
        self.read(|state| state.deployments.iter().find(|r| r.id == id).cloned())
    }

    async fn find_active(
        &self,
        app: &AppKey,
        trigger: &str,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.read(|state| {
            state
                .deployments
                .iter()
                .filter(|r| &r.app_key == app && r.trigger_name == trigger && r.status.is_active())
                .cloned()
                .collect()
        })
    }

    async fn find_by_token_hash(
        &self,
        digest: &TokenDigest,
    ) -> Result<Option<DeploymentRecord>, StoreError> {
        self.read(|state| {
            state
                .deployments
                .iter()
                .find(|r| r.approval.token_hash.as_ref() == Some(digest))
                .cloned()
        })
    }

    async fn find_by_delivery_id(
        &self,
        delivery_id: &str,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.read(|state| {
            state
                .deployments
                .iter()
                .filter(|r| r.delivery_id.as_deref() == Some(delivery_id))
                .cloned()
                .collect()
        })
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.read(|state| {
            state
                .deployments
                .iter()
                .filter(|r| {
                    r.status == DeploymentStatus::PendingApproval
                        && r.approval.expires_at.is_some_and(|at| now > at)
                })
                .cloned()
                .collect()
        })
    }

    async fn list(&self, filter: &DeploymentFilter) -> Result<Vec<DeploymentRecord>, StoreError> {
        let mut records: Vec<_> = self.read(|state| {
            state
                .deployments
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect()
        })?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}

#[async_trait]
impl ReleaseStore for MemoryStore {
    async fn insert_release(&self, release: NewRelease) -> Result<ReleaseRecord, StoreError> {
        self.write(|state| {
            if state
                .releases
                .iter()
                .any(|r| r.app_key == release.app_key && r.name == release.name)
            {
                return Err(StoreError::DuplicateRelease {
                    app: release.app_key,
                    release: release.name,
                });
            }
            state.next_release_sequence += 1;
            let record = ReleaseRecord {
                id: ReleaseId::generate(),
                app_key: release.app_key,
                name: release.name,
                path: release.path,
                commit_sha: release.commit_sha,
                deployment_id: release.deployment_id,
                is_active: true,
                size_bytes: release.size_bytes,
                sequence: state.next_release_sequence,
                created_at: release.created_at,
            };
            for other in state
                .releases
                .iter_mut()
                .filter(|r| r.app_key == record.app_key)
            {
                other.is_active = false;
            }
            state.releases.push(record.clone());
            Ok(record)
        })
    }

    async fn list_releases(&self, app: &AppKey) -> Result<Vec<ReleaseRecord>, StoreError> {
        let mut releases: Vec<_> = self.read(|state| {
            state
                .releases
                .iter()
                .filter(|r| &r.app_key == app)
                .cloned()
                .collect()
        })?;
        releases.sort_by_key(|r| r.sequence);
        Ok(releases)
    }

    async fn activate_release(
        &self,
        app: &AppKey,
        name: &ReleaseName,
    ) -> Result<ReleaseRecord, StoreError> {
        self.write(|state| {
            state
                .set_active(app, name)
                .ok_or_else(|| StoreError::ReleaseNotFound {
                    app: app.clone(),
                    release: name.clone(),
                })
        })
    }

    async fn delete_release(&self, app: &AppKey, name: &ReleaseName) -> Result<(), StoreError> {
        self.write(|state| {
            let before = state.releases.len();
            state
                .releases
                .retain(|r| !(&r.app_key == app && &r.name == name));
            if state.releases.len() == before {
                return Err(StoreError::ReleaseNotFound {
                    app: app.clone(),
                    release: name.clone(),
                });
            }
            Ok(())
        })
    }
}
