// ABOUTME: Persistence traits for deployment and release records.
// ABOUTME: Writes to deployments are compare-and-swap on the expected status.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::approval::TokenDigest;
use crate::deploy::{DeploymentRecord, DeploymentStatus};
use crate::strategy::{NewRelease, ReleaseRecord};
use crate::types::{AppKey, DeploymentId, ReleaseName};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("deployment {0} already exists")]
    DuplicateId(DeploymentId),

    #[error("idempotency key {0} already recorded")]
    DuplicateDelivery(String),

    #[error("deployment {0} not found")]
    NotFound(DeploymentId),

    /// The record moved on since it was read.
    #[error("deployment {id} is {actual}, expected {expected}")]
    StatusChanged {
        id: DeploymentId,
        expected: DeploymentStatus,
        actual: DeploymentStatus,
    },

    #[error("release '{release}' not found for app '{app}'")]
    ReleaseNotFound { app: AppKey, release: ReleaseName },

    #[error("release '{release}' already recorded for app '{app}'")]
    DuplicateRelease { app: AppKey, release: ReleaseName },

    #[error("state file lock {path} is held by {holder}")]
    Locked { path: String, holder: String },

    #[error("failed to persist state to {path}: {reason}")]
    Persist { path: String, reason: String },

    #[error("failed to load state from {path}: {reason}")]
    Load { path: String, reason: String },
}

/// Filter for listing deployments. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    pub app: Option<AppKey>,
    pub status: Option<DeploymentStatus>,
    /// Newest first, at most this many.
    pub limit: Option<usize>,
}

impl DeploymentFilter {
    pub fn matches(&self, record: &DeploymentRecord) -> bool {
        self.app.as_ref().is_none_or(|app| &record.app_key == app)
            && self.status.is_none_or(|status| record.status == status)
    }
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Fails with `DuplicateDelivery` when the idempotency key is taken.
    async fn insert(&self, record: &DeploymentRecord) -> Result<(), StoreError>;

    /// Replace the record only if its stored status is still `expected`.
    async fn update(
        &self,
        record: &DeploymentRecord,
        expected: DeploymentStatus,
    ) -> Result<(), StoreError>;

    async fn get(&self, id: DeploymentId) -> Result<Option<DeploymentRecord>, StoreError>;

    async fn find_active(
        &self,
        app: &AppKey,
        trigger: &str,
    ) -> Result<Vec<DeploymentRecord>, StoreError>;

    async fn find_by_token_hash(
        &self,
        digest: &TokenDigest,
    ) -> Result<Option<DeploymentRecord>, StoreError>;

    async fn find_by_delivery_id(
        &self,
        delivery_id: &str,
    ) -> Result<Vec<DeploymentRecord>, StoreError>;

    /// Pending approvals whose window closed before `now`.
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<DeploymentRecord>, StoreError>;

    async fn list(&self, filter: &DeploymentFilter) -> Result<Vec<DeploymentRecord>, StoreError>;
}

#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Record a new active release; every other release of the app goes inactive.
    /// A name already recorded for the app is refused.
    async fn insert_release(&self, release: NewRelease) -> Result<ReleaseRecord, StoreError>;

    /// Releases of one app ordered by ascending sequence.
    async fn list_releases(&self, app: &AppKey) -> Result<Vec<ReleaseRecord>, StoreError>;

    /// Mark `name` active and every other release of the app inactive.
    async fn activate_release(
        &self,
        app: &AppKey,
        name: &ReleaseName,
    ) -> Result<ReleaseRecord, StoreError>;

    async fn delete_release(&self, app: &AppKey, name: &ReleaseName) -> Result<(), StoreError>;
}
