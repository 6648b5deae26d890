// ABOUTME: Command module aggregator for the wharf CLI.
// ABOUTME: Builds the orchestrator from configuration and re-exports command handlers.

mod approval;
mod event;
mod manage;
mod query;
mod validate;

pub use approval::{approve, reject, sweep};
pub use event::{deploy, event, read_event};
pub use manage::{cancel, dispatch, rollback};
pub use query::{list, releases, status};
pub use validate::validate;

use std::path::Path;
use std::sync::Arc;
use wharf::approval::{Actor, TokenDigester};
use wharf::config::Config;
use wharf::deploy::{DispatcherConfig, Orchestrator};
use wharf::error::{Error, Result};
use wharf::hooks::{LogNotifier, NotificationObserver, Observers, TracingObserver};
use wharf::registry::AppRegistry;
use wharf::runner::ScriptRunner;
use wharf::store::MemoryStore;
use wharf::strategy::StrategyRegistry;
use wharf::types::DeploymentId;

/// Load the configuration from `path`, or discover it in `cwd`.
pub fn load_config(path: Option<&Path>, cwd: &Path) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::discover(cwd),
    }
}

/// Directory next to the state file holding per-(app, trigger) lock files.
const LOCK_DIR: &str = "locks";

/// Wire the orchestrator the CLI uses: script runner, file store, log notifier.
///
/// Relative `stories_dir` and `state_file` paths resolve against `base`.
pub fn build_orchestrator(config: &Config, base: &Path) -> Result<Arc<Orchestrator>> {
    let apps = Arc::new(AppRegistry::from_config(config));
    let state_file = base.join(config.settings.state_file_path());
    let store = Arc::new(MemoryStore::open(&state_file)?);
    let lock_dir = state_file
        .parent()
        .map(|dir| dir.join(LOCK_DIR))
        .unwrap_or_else(|| base.join(LOCK_DIR));
    let runner = Arc::new(ScriptRunner::new(&base.join(&config.settings.stories_dir)));
    let strategies = StrategyRegistry::standard(runner, store.clone());

    let observers = Observers::new()
        .with(Arc::new(TracingObserver))
        .with(Arc::new(NotificationObserver::new(
            apps.clone(),
            Arc::new(LogNotifier),
        )));

    let mut builder = Orchestrator::builder(apps, store.clone(), store, strategies)
        .observers(observers)
        .dispatcher_config(DispatcherConfig::from_settings(&config.settings))
        .lock_dir(lock_dir);
    if let Some(secret) = config.approval_secret()? {
        builder = builder.digester(TokenDigester::new(secret.as_bytes())?);
    }
    Ok(Arc::new(builder.build()))
}

pub fn actor(name: Option<String>) -> Actor {
    let principal = name
        .or_else(|| std::env::var("USER").ok())
        .filter(|n| !n.trim().is_empty());
    Actor {
        principal,
        address: None,
    }
}

pub fn parse_id(raw: &str) -> Result<DeploymentId> {
    raw.parse()
        .map_err(|_| Error::InvalidArgument(format!("invalid deployment id '{raw}'")))
}
