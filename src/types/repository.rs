// ABOUTME: Normalized source repository identity used for trigger matching.
// ABOUTME: Folds GitHub SSH/HTTPS URLs and bare names into a canonical org/repo form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host prefixes that are reduced to their `org/repo` path.
const GITHUB_PREFIXES: &[&str] = &[
    "git@github.com:",
    "ssh://git@github.com/",
    "https://github.com/",
    "http://github.com/",
    "https://www.github.com/",
    "github.com/",
];

/// A repository name after normalization.
///
/// Two identities are equal only if their normalized forms are byte-identical.
/// There is no prefix or substring matching: `acme/app` never matches
/// `acme/app-fork` or `evil-acme/app`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryIdentity(String);

impl RepositoryIdentity {
    /// Normalize a raw repository value. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RepositoryIdentity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RepositoryIdentity::parse(&value).ok_or_else(|| "repository cannot be empty".to_string())
    }
}

impl From<RepositoryIdentity> for String {
    fn from(id: RepositoryIdentity) -> Self {
        id.0
    }
}

fn normalize(raw: &str) -> String {
    let mut value = raw.trim().to_lowercase();

    trim_trailing_slashes(&mut value);
    if let Some(stripped) = value.strip_suffix(".git") {
        value = stripped.to_string();
    }
    trim_trailing_slashes(&mut value);

    for prefix in GITHUB_PREFIXES {
        if let Some(path) = value.strip_prefix(prefix) {
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            return match segments.as_slice() {
                [org, repo, ..] => format!("{org}/{repo}"),
                _ => segments.join("/"),
            };
        }
    }

    value
}

fn trim_trailing_slashes(value: &mut String) {
    while value.ends_with('/') {
        value.pop();
    }
}
