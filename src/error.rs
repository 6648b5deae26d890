// ABOUTME: Application-wide error types for wharf.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::approval::TokenError;
use crate::deploy::DeployError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid configuration for app '{app}': {}", violations.join("; "))]
    InvalidApp {
        app: String,
        violations: Vec<String>,
    },

    #[error("{0}")]
    Deploy(#[from] DeployError),

    #[error("approval setup failed: {0}")]
    Approval(#[from] TokenError),

    #[error("deployment {id} finished as {status}")]
    Unsuccessful { id: String, status: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
