// ABOUTME: Lookup over the configured apps: by key, by repository, and by inbound event.
// ABOUTME: Built once from the validated config and never mutated.

mod event;
mod matcher;

pub use event::SourceEvent;
pub use matcher::{TriggerMatch, repository_matches};

use std::collections::HashMap;

use crate::config::{AppConfig, Config, EventKind};
use crate::deploy::DeployError;
use crate::types::RepositoryIdentity;

#[derive(Debug, Clone, Default)]
pub struct AppRegistry {
    apps: Vec<AppConfig>,
    index: HashMap<String, usize>,
}

impl AppRegistry {
    /// Apps keep their configured order; later duplicates of a key are ignored.
    pub fn new(apps: impl IntoIterator<Item = AppConfig>) -> Self {
        let mut registry = Self::default();
        for app in apps {
            let key = app.key.to_string();
            if registry.index.contains_key(&key) {
                continue;
            }
            registry.index.insert(key, registry.apps.len());
            registry.apps.push(app);
        }
        registry
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.apps.iter().cloned())
    }

    pub fn apps(&self) -> &[AppConfig] {
        &self.apps
    }

    pub fn resolve(&self, key: &str) -> Result<&AppConfig, DeployError> {
        self.index
            .get(key)
            .map(|&i| &self.apps[i])
            .ok_or_else(|| DeployError::AppNotFound(key.to_string()))
    }

    /// First app whose configured repository equals `identity`.
    pub fn find_by_repository(&self, identity: &RepositoryIdentity) -> Option<&AppConfig> {
        self.apps
            .iter()
            .find(|app| app.repository.as_ref() == Some(identity))
    }

    /// Every (app, trigger) pair the event selects, in configuration order.
    pub fn find_matching_triggers(
        &self,
        kind: EventKind,
        git_ref: &str,
        repository: Option<&str>,
    ) -> Vec<TriggerMatch<'_>> {
        let identity = match repository {
            Some(raw) => match RepositoryIdentity::parse(raw) {
                Some(identity) => Some(identity),
                None => {
                    tracing::warn!(repository = raw, "event repository is not a valid identity");
                    return Vec::new();
                }
            },
            None => None,
        };

        self.apps
            .iter()
            .filter(|app| repository_matches(app, identity.as_ref()))
            .flat_map(|app| {
                app.triggers
                    .iter()
                    .filter(move |trigger| trigger.matches(kind, git_ref))
                    .map(move |trigger| TriggerMatch { app, trigger })
            })
            .collect()
    }
}
