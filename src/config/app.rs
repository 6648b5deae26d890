// ABOUTME: Per-application deployment configuration and its load-time validation.
// ABOUTME: Covers repository identity, target path, strategy options, and triggers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use super::notify::NotificationRoute;
use super::settings::Settings;
use super::trigger::{Trigger, TriggerEntry};
use crate::types::{AppKey, ReleaseName, RepositoryIdentity};

/// Characters refused in filesystem paths handed to stories.
const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$'];

/// Release strategy for an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// In-place update of a single working directory.
    Simple,
    /// Immutable release directories activated through a `current` symlink.
    Advanced,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Simple => "simple",
            StrategyKind::Advanced => "advanced",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(StrategyKind::Simple),
            "advanced" => Ok(StrategyKind::Advanced),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

/// Options used by the advanced strategy.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseOptions {
    /// Inactive releases retained after cleanup. Values below 1 count as 1.
    #[serde(default = "default_keep")]
    pub keep: i64,

    #[serde(default)]
    pub shared_dirs: Vec<String>,

    #[serde(default)]
    pub shared_files: Vec<String>,

    #[serde(default = "default_releases_dir")]
    pub releases_dir: String,

    #[serde(default = "default_shared_dir")]
    pub shared_dir: String,

    #[serde(default = "default_current_link")]
    pub current_link: String,
}

fn default_keep() -> i64 {
    5
}

fn default_releases_dir() -> String {
    "releases".to_string()
}

fn default_shared_dir() -> String {
    "shared".to_string()
}

fn default_current_link() -> String {
    "current".to_string()
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        ReleaseOptions {
            keep: default_keep(),
            shared_dirs: Vec::new(),
            shared_files: Vec::new(),
            releases_dir: default_releases_dir(),
            shared_dir: default_shared_dir(),
            current_link: default_current_link(),
        }
    }
}

impl ReleaseOptions {
    /// Retention count with the floor applied.
    pub fn effective_keep(&self) -> usize {
        self.keep.max(1) as usize
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub key: AppKey,
    pub name: String,
    pub repository: Option<RepositoryIdentity>,
    pub path: PathBuf,
    pub strategy: StrategyKind,
    pub releases: ReleaseOptions,
    pub triggers: Vec<Trigger>,
    pub notifications: Vec<NotificationRoute>,
}

impl AppConfig {
    pub fn trigger(&self, name: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.name == name)
    }

    pub fn releases_path(&self) -> PathBuf {
        self.path.join(&self.releases.releases_dir)
    }

    pub fn release_path(&self, name: &ReleaseName) -> PathBuf {
        self.releases_path().join(name.as_str())
    }

    pub fn shared_path(&self) -> PathBuf {
        self.path.join(&self.releases.shared_dir)
    }

    pub fn current_path(&self) -> PathBuf {
        self.path.join(&self.releases.current_link)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct AppEntry {
    key: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    repository: Option<String>,
    path: PathBuf,
    #[serde(default = "default_strategy")]
    strategy: String,
    #[serde(default)]
    releases: ReleaseOptions,
    #[serde(default)]
    triggers: Vec<TriggerEntry>,
    #[serde(default)]
    notifications: Vec<NotificationRoute>,
}

fn default_strategy() -> String {
    "simple".to_string()
}

impl AppEntry {
    pub(super) fn key(&self) -> &str {
        &self.key
    }

    /// Validate into an [`AppConfig`], collecting every violation.
    pub(super) fn validate(self, settings: &Settings) -> Result<AppConfig, Vec<String>> {
        let mut violations = Vec::new();

        let key = AppKey::new(&self.key)
            .map_err(|e| violations.push(e.to_string()))
            .ok();

        let strategy = self
            .strategy
            .parse::<StrategyKind>()
            .map_err(|e| violations.push(e))
            .ok();

        let repository = match self.repository.as_deref() {
            Some(raw) => {
                let parsed = RepositoryIdentity::parse(raw);
                if parsed.is_none() {
                    violations.push("repository cannot be blank".to_string());
                }
                parsed
            }
            None => None,
        };

        let path_str = self.path.to_string_lossy();
        if path_str.trim().is_empty() {
            violations.push("path cannot be empty".to_string());
        } else if let Some(c) = path_str.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            violations.push(format!("path contains shell metacharacter '{c}'"));
        }

        check_relative("releases_dir", &self.releases.releases_dir, &mut violations);
        check_relative("shared_dir", &self.releases.shared_dir, &mut violations);
        check_relative("current_link", &self.releases.current_link, &mut violations);
        for dir in &self.releases.shared_dirs {
            check_relative("shared_dirs entry", dir, &mut violations);
        }
        for file in &self.releases.shared_files {
            check_relative("shared_files entry", file, &mut violations);
        }

        let mut triggers = Vec::with_capacity(self.triggers.len());
        let mut seen = std::collections::HashSet::new();
        for entry in self.triggers {
            if !seen.insert(entry.name().to_string()) {
                violations.push(format!("duplicate trigger name '{}'", entry.name()));
                continue;
            }
            match entry.validate(settings.approval_timeout) {
                Ok(trigger) => triggers.push(trigger),
                Err(errs) => violations.extend(errs),
            }
        }

        match (key, strategy) {
            (Some(key), Some(strategy)) if violations.is_empty() => Ok(AppConfig {
                name: self.name.unwrap_or_else(|| key.to_string()),
                key,
                repository,
                path: self.path,
                strategy,
                releases: self.releases,
                triggers,
                notifications: self.notifications,
            }),
            _ => Err(violations),
        }
    }
}

/// Paths under the app root must stay under it.
fn check_relative(label: &str, value: &str, violations: &mut Vec<String>) {
    let path = Path::new(value);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if value.trim().is_empty() || escapes {
        violations.push(format!("{label} '{value}' must be a relative path below the app root"));
    } else if let Some(c) = value.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        violations.push(format!("{label} '{value}' contains shell metacharacter '{c}'"));
    }
}
