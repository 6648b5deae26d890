// ABOUTME: Test support utilities.
// ABOUTME: Provides a scripted process runner, app builders, and an orchestrator harness.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;

use wharf::approval::TokenDigester;
use wharf::config::{
    AppConfig, ApprovalPolicy, EventKind, RefMatcher, ReleaseOptions, StrategyKind, TagPattern,
    Trigger,
};
use wharf::deploy::{DispatcherConfig, Orchestrator};
use wharf::registry::AppRegistry;
use wharf::runner::{ProcessRunner, RunOutput, RunnerError, StoryInvocation};
use wharf::store::MemoryStore;
use wharf::strategy::StrategyRegistry;
use wharf::types::{AppKey, RepositoryIdentity};

/// HMAC key used by every harness.
#[allow(dead_code)]
pub const SECRET: &[u8] = b"test-approval-secret-0123456789";

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("wharf=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Canned behaviour for one story.
#[derive(Debug, Clone, Default)]
#[allow(dead_code)]
pub struct Script {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub delay: Option<Duration>,
    pub missing: bool,
}

#[allow(dead_code)]
impl Script {
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    pub fn stdout(text: &str) -> Self {
        Self {
            stdout: text.to_string(),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }
}

/// Runner that records invocations and answers from scripts.
/// Unscripted stories succeed with empty output.
#[derive(Default)]
#[allow(dead_code)]
pub struct FakeRunner {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<StoryInvocation>>,
    completed: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, story: &str, script: Script) {
        self.scripts.lock().insert(story.to_string(), script);
    }

    pub fn calls(&self) -> Vec<StoryInvocation> {
        self.calls.lock().clone()
    }

    pub fn stories(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.story.clone()).collect()
    }

    /// Stories whose run finished rather than being dropped.
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, invocation: &StoryInvocation) -> Result<RunOutput, RunnerError> {
        self.calls.lock().push(invocation.clone());
        let script = self
            .scripts
            .lock()
            .get(&invocation.story)
            .cloned()
            .unwrap_or_default();

        if script.missing {
            return Err(RunnerError::StoryNotFound {
                story: invocation.story.clone(),
                path: Path::new("/nonexistent").join(&invocation.story),
            });
        }
        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.lock().push(invocation.story.clone());
        Ok(RunOutput {
            stdout: script.stdout,
            stderr: script.stderr,
            exit_code: script.exit_code,
        })
    }
}

#[allow(dead_code)]
pub fn push_trigger(name: &str, branch: &str) -> Trigger {
    Trigger {
        name: name.to_string(),
        event: EventKind::Push,
        matcher: RefMatcher::Branch(branch.to_string()),
        approval: ApprovalPolicy {
            required: false,
            timeout: Duration::from_secs(3600),
        },
        story: "deploy".to_string(),
    }
}

#[allow(dead_code)]
pub fn release_trigger(name: &str, pattern: &str, approval: Option<Duration>) -> Trigger {
    Trigger {
        name: name.to_string(),
        event: EventKind::Release,
        matcher: RefMatcher::Tag(TagPattern::compile(pattern).unwrap()),
        approval: ApprovalPolicy {
            required: approval.is_some(),
            timeout: approval.unwrap_or(Duration::from_secs(3600)),
        },
        story: "deploy".to_string(),
    }
}

#[allow(dead_code)]
pub fn app(key: &str, strategy: StrategyKind, path: &Path, triggers: Vec<Trigger>) -> AppConfig {
    AppConfig {
        key: AppKey::new(key).unwrap(),
        name: key.to_string(),
        repository: RepositoryIdentity::parse(&format!("acme/{key}")),
        path: path.to_path_buf(),
        strategy,
        releases: ReleaseOptions::default(),
        triggers,
        notifications: vec![],
    }
}

/// Orchestrator over an in-memory store and a fake runner.
#[allow(dead_code)]
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<MemoryStore>,
    pub runner: Arc<FakeRunner>,
}

#[allow(dead_code)]
pub fn harness(apps: Vec<AppConfig>) -> Harness {
    harness_with(apps, DispatcherConfig::default())
}

#[allow(dead_code)]
pub fn harness_with(apps: Vec<AppConfig>, config: DispatcherConfig) -> Harness {
    init_tracing();
    let apps = Arc::new(AppRegistry::new(apps));
    let store = Arc::new(MemoryStore::new());
    let runner = FakeRunner::new();
    let strategies = StrategyRegistry::standard(runner.clone(), store.clone());
    let orchestrator = Orchestrator::builder(apps, store.clone(), store.clone(), strategies)
        .digester(TokenDigester::new(SECRET).unwrap())
        .dispatcher_config(config)
        .build();
    Harness {
        orchestrator: Arc::new(orchestrator),
        store,
        runner,
    }
}
