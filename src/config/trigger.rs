// ABOUTME: Trigger definitions mapping source events to a deployment policy.
// ABOUTME: Validates branch and tag-pattern criteria and approval windows.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of source-control event a trigger reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Push,
    Release,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::Release => "release",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "push" => Ok(EventKind::Push),
            "release" => Ok(EventKind::Release),
            other => Err(format!("unsupported event kind '{other}'")),
        }
    }
}

/// Compiled tag pattern. Keeps the source text for display and errors.
#[derive(Debug, Clone)]
pub struct TagPattern {
    source: String,
    regex: Regex,
}

impl TagPattern {
    pub fn compile(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(source)?;
        // Exercise the automaton once so pathological patterns fail at load.
        let _ = regex.is_match("");
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// How a trigger decides whether a ref belongs to it.
#[derive(Debug, Clone)]
pub enum RefMatcher {
    Branch(String),
    Tag(TagPattern),
}

impl RefMatcher {
    /// Branches match either `main` or `refs/heads/main`. Tag patterns are
    /// applied to the raw ref, then to the ref without a `refs/tags/` prefix.
    pub fn matches(&self, git_ref: &str) -> bool {
        match self {
            RefMatcher::Branch(branch) => {
                git_ref == branch
                    || git_ref
                        .strip_prefix("refs/heads/")
                        .is_some_and(|b| b == branch)
            }
            RefMatcher::Tag(pattern) => {
                pattern.is_match(git_ref)
                    || git_ref
                        .strip_prefix("refs/tags/")
                        .is_some_and(|t| pattern.is_match(t))
            }
        }
    }
}

impl fmt::Display for RefMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefMatcher::Branch(b) => write!(f, "branch {b}"),
            RefMatcher::Tag(p) => write!(f, "tag /{}/", p.as_str()),
        }
    }
}

/// Whether a deployment waits for a human, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalPolicy {
    pub required: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Trigger {
    pub name: String,
    pub event: EventKind,
    pub matcher: RefMatcher,
    pub approval: ApprovalPolicy,
    /// Story executed by the strategy.
    pub story: String,
}

impl Trigger {
    pub fn matches(&self, event: EventKind, git_ref: &str) -> bool {
        self.event == event && self.matcher.matches(git_ref)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TriggerEntry {
    name: String,
    #[serde(alias = "on")]
    event: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    approval: ApprovalEntry,
    #[serde(default = "default_story")]
    story: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalEntry {
    #[serde(default)]
    required: bool,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

fn default_story() -> String {
    "deploy".to_string()
}

impl TriggerEntry {
    pub(super) fn name(&self) -> &str {
        &self.name
    }

    /// Validate into a [`Trigger`], collecting every violation.
    pub(super) fn validate(self, default_timeout: Duration) -> Result<Trigger, Vec<String>> {
        let mut violations = Vec::new();
        let label = format!("trigger '{}'", self.name);

        if self.name.trim().is_empty() {
            violations.push("trigger name cannot be empty".to_string());
        }

        if !is_story_name(&self.story) {
            violations.push(format!("{label}: invalid story name '{}'", self.story));
        }

        if self.approval.timeout.is_some_and(|t| t.is_zero()) {
            violations.push(format!("{label}: approval timeout must be positive"));
        }

        let event = match self.event.parse::<EventKind>() {
            Ok(event) => Some(event),
            Err(e) => {
                violations.push(format!("{label}: {e}"));
                None
            }
        };

        let matcher = match event {
            Some(EventKind::Push) => match self.branch.as_deref().map(str::trim) {
                Some(branch) if !branch.is_empty() => Some(RefMatcher::Branch(branch.to_string())),
                _ => {
                    violations.push(format!("{label}: push triggers require a branch"));
                    None
                }
            },
            Some(EventKind::Release) => match self.pattern.as_deref() {
                Some(pattern) if !pattern.is_empty() => match TagPattern::compile(pattern) {
                    Ok(compiled) => Some(RefMatcher::Tag(compiled)),
                    Err(e) => {
                        violations.push(format!("{label}: invalid tag pattern: {e}"));
                        None
                    }
                },
                _ => {
                    violations.push(format!("{label}: release triggers require a pattern"));
                    None
                }
            },
            None => None,
        };

        match (event, matcher) {
            (Some(event), Some(matcher)) if violations.is_empty() => Ok(Trigger {
                name: self.name,
                event,
                matcher,
                approval: ApprovalPolicy {
                    required: self.approval.required,
                    timeout: self.approval.timeout.unwrap_or(default_timeout),
                },
                story: self.story,
            }),
            _ => Err(violations),
        }
    }
}

/// Story names map to files in the stories directory.
pub(crate) fn is_story_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
