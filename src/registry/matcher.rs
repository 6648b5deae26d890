// ABOUTME: Matching of inbound events against app repositories and triggers.
// ABOUTME: Repository comparison is exact after normalization.

use crate::config::{AppConfig, Trigger};
use crate::types::RepositoryIdentity;

/// One (app, trigger) pair selected by an event.
#[derive(Debug, Clone, Copy)]
pub struct TriggerMatch<'a> {
    pub app: &'a AppConfig,
    pub trigger: &'a Trigger,
}

/// An event naming a repository only reaches apps configured with that
/// repository. An event without one is matched on triggers alone.
pub fn repository_matches(app: &AppConfig, event: Option<&RepositoryIdentity>) -> bool {
    match event {
        Some(identity) => app.repository.as_ref() == Some(identity),
        None => true,
    }
}
