// ABOUTME: Sortable release directory names for the advanced strategy.
// ABOUTME: Names combine a UTC timestamp, a short commit sha, and a random suffix.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const SHORT_SHA_LEN: usize = 7;

#[derive(Debug, Error)]
pub enum ReleaseNameError {
    #[error("release name cannot be empty")]
    Empty,

    #[error("release name cannot be '.' or '..'")]
    Relative,

    #[error("invalid character in release name: '{0}'")]
    InvalidChar(char),
}

/// Name of a release directory, safe to join onto the releases path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseName(String);

impl ReleaseName {
    /// Build a name such as `20240501120000_abc1234_9f3e`.
    ///
    /// The suffix keeps redeploys of one sha within a second apart.
    pub fn generate(at: DateTime<Utc>, commit_sha: &str) -> Self {
        let short: String = commit_sha
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(SHORT_SHA_LEN)
            .collect();
        let stamp = at.format(TIMESTAMP_FORMAT);
        let suffix: u16 = rand::thread_rng().r#gen();
        if short.is_empty() {
            Self(format!("{stamp}_manual_{suffix:04x}"))
        } else {
            Self(format!("{stamp}_{}_{suffix:04x}", short.to_lowercase()))
        }
    }

    /// Validate an operator-supplied name.
    pub fn new(value: &str) -> Result<Self, ReleaseNameError> {
        if value.is_empty() {
            return Err(ReleaseNameError::Empty);
        }
        if value == "." || value == ".." {
            return Err(ReleaseNameError::Relative);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.'))
        {
            return Err(ReleaseNameError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ReleaseName {
    type Error = ReleaseNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ReleaseName::new(&value)
    }
}

impl From<ReleaseName> for String {
    fn from(name: ReleaseName) -> Self {
        name.0
    }
}
