// ABOUTME: Post-transition hooks for deployment records.
// ABOUTME: Observers log transitions and fan out notifications to configured routes.

use std::sync::Arc;

use crate::config::NotificationRoute;
use crate::deploy::{DeploymentRecord, DeploymentStatus};
use crate::registry::AppRegistry;

/// Called after a transition has been persisted. Must not fail.
pub trait TransitionObserver: Send + Sync {
    /// `from` is `None` when the record was just created.
    fn on_transition(&self, record: &DeploymentRecord, from: Option<DeploymentStatus>);
}

/// Ordered set of observers, invoked synchronously.
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn TransitionObserver>>,
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.observers.len())
            .finish()
    }
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn TransitionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn notify(&self, record: &DeploymentRecord, from: Option<DeploymentStatus>) {
        for observer in &self.observers {
            observer.on_transition(record, from);
        }
    }
}

/// Emits one structured log event per transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TransitionObserver for TracingObserver {
    fn on_transition(&self, record: &DeploymentRecord, from: Option<DeploymentStatus>) {
        let from = from.map(|s| s.as_str()).unwrap_or("new");
        if record.status == DeploymentStatus::Failed {
            tracing::warn!(
                deployment = %record.id.short(),
                app = %record.app_key,
                trigger = %record.trigger_name,
                from,
                to = %record.status,
                exit_code = ?record.execution.exit_code,
                "deployment transition"
            );
        } else {
            tracing::info!(
                deployment = %record.id.short(),
                app = %record.app_key,
                trigger = %record.trigger_name,
                from,
                to = %record.status,
                "deployment transition"
            );
        }
    }
}

/// Message handed to a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub app: String,
    pub status: DeploymentStatus,
    pub subject: String,
    pub body: String,
}

impl Notice {
    pub fn for_record(record: &DeploymentRecord) -> Self {
        let short_sha: String = record.commit_sha.chars().take(7).collect();
        let subject = format!(
            "[{}] {} {} → {}",
            record.app_name, record.trigger_name, short_sha, record.status
        );
        let mut body = format!(
            "Deployment {} of {} ({}) by {} is now {}.",
            record.id, record.app_name, record.trigger_ref, record.author, record.status
        );
        if let Some(ref reason) = record.approval.rejection_reason {
            body.push_str(&format!(" Reason: {reason}."));
        }
        if let Some(code) = record.execution.exit_code {
            body.push_str(&format!(" Exit code {code}."));
        }
        Self {
            app: record.app_key.to_string(),
            status: record.status,
            subject,
            body,
        }
    }
}

/// Delivers notices to a channel. Delivery failures are logged, never raised.
pub trait Notifier: Send + Sync {
    fn send(&self, route: &NotificationRoute, notice: &Notice);
}

/// Writes notices to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, route: &NotificationRoute, notice: &Notice) {
        tracing::info!(
            channel = %route.channel,
            target = %route.target,
            subject = %notice.subject,
            "notification"
        );
    }
}

/// Sends a notice to every route of the record's app that wants the new status.
pub struct NotificationObserver {
    apps: Arc<AppRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationObserver {
    pub fn new(apps: Arc<AppRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        Self { apps, notifier }
    }
}

impl TransitionObserver for NotificationObserver {
    fn on_transition(&self, record: &DeploymentRecord, _from: Option<DeploymentStatus>) {
        let Ok(app) = self.apps.resolve(record.app_key.as_str()) else {
            return;
        };
        let routes: Vec<_> = app
            .notifications
            .iter()
            .filter(|route| route.wants(record.status))
            .collect();
        if routes.is_empty() {
            return;
        }
        let notice = Notice::for_record(record);
        for route in routes {
            self.notifier.send(route, &notice);
        }
    }
}
