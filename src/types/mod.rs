// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod app_key;
mod id;
mod release_name;
mod repository;

pub use app_key::{AppKey, AppKeyError};
pub use id::{DeploymentId, ReleaseId};
pub use release_name::{ReleaseName, ReleaseNameError};
pub use repository::RepositoryIdentity;
