// ABOUTME: Configuration types and parsing for wharf.yml.
// ABOUTME: Handles YAML parsing, validation of every app, and file discovery.

mod app;
mod deserialize;
mod env_value;
mod init;
mod notify;
mod settings;
mod trigger;

pub use app::{AppConfig, ReleaseOptions, StrategyKind};
pub use env_value::EnvValue;
pub use init::init_config;
pub use notify::{NotificationRoute, NotifyChannel};
pub use settings::Settings;
pub use trigger::{ApprovalPolicy, EventKind, RefMatcher, TagPattern, Trigger};
pub(crate) use trigger::is_story_name;

use crate::error::{Error, Result};
use app::AppEntry;
use deserialize::deserialize_apps;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "wharf.yml";
pub const CONFIG_FILENAME_ALT: &str = "wharf.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".wharf/config.yml";

/// Minimum accepted length of the approval secret, in bytes.
const MIN_SECRET_LEN: usize = 16;

/// Validated configuration. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub apps: NonEmpty<AppConfig>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    settings: Settings,
    #[serde(deserialize_with = "deserialize_apps")]
    apps: NonEmpty<AppEntry>,
}

impl Config {
    /// Parse and validate. The first invalid app aborts the whole load.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        let settings = raw.settings;

        let mut seen = HashSet::new();
        let mut apps = Vec::with_capacity(raw.apps.len());
        for entry in raw.apps {
            let key = entry.key().to_string();
            if !seen.insert(key.clone()) {
                return Err(Error::InvalidConfig(format!("duplicate app key '{key}'")));
            }
            let app = entry
                .validate(&settings)
                .map_err(|violations| Error::InvalidApp {
                    app: key,
                    violations,
                })?;
            apps.push(app);
        }

        let needs_secret = apps
            .iter()
            .flat_map(|a| a.triggers.iter())
            .any(|t| t.approval.required);
        if needs_secret && settings.approval_secret.is_none() {
            return Err(Error::InvalidConfig(
                "settings.approval_secret is required when a trigger requires approval"
                    .to_string(),
            ));
        }

        let apps = NonEmpty::from_vec(apps)
            .ok_or_else(|| Error::InvalidConfig("at least one app is required".to_string()))?;

        Ok(Config { settings, apps })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Resolve the approval digest key.
    pub fn approval_secret(&self) -> Result<Option<String>> {
        let Some(ref value) = self.settings.approval_secret else {
            return Ok(None);
        };
        let secret = value.resolve()?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::InvalidConfig(format!(
                "approval secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        Ok(Some(secret))
    }
}
