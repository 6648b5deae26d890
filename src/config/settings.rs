// ABOUTME: Orchestrator-wide settings shared by every configured app.
// ABOUTME: Covers story location, state file, timeouts, and the approval secret.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::EnvValue;

/// Base directory for wharf state files (XDG Base Directory compliant).
const STATE_DIR: &str = ".local/state/wharf";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Directory holding executable story scripts.
    #[serde(default = "default_stories_dir")]
    pub stories_dir: PathBuf,

    /// JSON file used to persist deployment and release records.
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Hard wall-clock limit for a single story execution.
    #[serde(default = "default_deploy_timeout", with = "humantime_serde")]
    pub deploy_timeout: Duration,

    /// Approval window used by triggers that do not set their own.
    #[serde(default = "default_approval_timeout", with = "humantime_serde")]
    pub approval_timeout: Duration,

    /// Key for the approval token digest.
    #[serde(default)]
    pub approval_secret: Option<EnvValue>,
}

fn default_stories_dir() -> PathBuf {
    PathBuf::from("stories")
}

fn default_deploy_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_approval_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            stories_dir: default_stories_dir(),
            state_file: None,
            deploy_timeout: default_deploy_timeout(),
            approval_timeout: default_approval_timeout(),
            approval_secret: None,
        }
    }
}

impl Settings {
    /// Resolve the state file, falling back to `$HOME/.local/state/wharf/state.json`.
    pub fn state_file_path(&self) -> PathBuf {
        if let Some(ref path) = self.state_file {
            return path.clone();
        }
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(STATE_DIR).join("state.json")
    }
}
