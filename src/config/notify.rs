// ABOUTME: Notification routing targets attached to an app.
// ABOUTME: Routes select a channel, a destination, and the statuses worth reporting.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::deploy::DeploymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
    Slack,
    Discord,
    Telegram,
    Email,
    Webhook,
}

impl fmt::Display for NotifyChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotifyChannel::Slack => "slack",
            NotifyChannel::Discord => "discord",
            NotifyChannel::Telegram => "telegram",
            NotifyChannel::Email => "email",
            NotifyChannel::Webhook => "webhook",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRoute {
    pub channel: NotifyChannel,
    /// Channel-specific destination (chat channel, address, URL).
    pub target: String,
    /// Statuses to report. Empty means every transition.
    #[serde(default)]
    pub events: Vec<DeploymentStatus>,
}

impl NotificationRoute {
    pub fn wants(&self, status: DeploymentStatus) -> bool {
        self.events.is_empty() || self.events.contains(&status)
    }
}
