// ABOUTME: Normalized inbound source-control event.
// ABOUTME: Produced by whatever receives webhooks; consumed by the orchestrator.

use serde::{Deserialize, Serialize};

use crate::config::EventKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEvent {
    pub kind: EventKind,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub repository: Option<String>,
    pub author: String,
    pub commit_sha: String,
    #[serde(default)]
    pub commit_message: Option<String>,
    /// Delivery id from the sender; repeats never create a second record.
    #[serde(default)]
    pub delivery_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SourceEvent {
    pub fn new(kind: EventKind, git_ref: &str, commit_sha: &str, author: &str) -> Self {
        Self {
            kind,
            git_ref: git_ref.to_string(),
            repository: None,
            author: author.to_string(),
            commit_sha: commit_sha.to_string(),
            commit_message: None,
            delivery_id: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn repository(mut self, repository: &str) -> Self {
        self.repository = Some(repository.to_string());
        self
    }

    pub fn delivery(mut self, delivery_id: &str) -> Self {
        self.delivery_id = Some(delivery_id.to_string());
        self
    }

    pub fn message(mut self, message: &str) -> Self {
        self.commit_message = Some(message.to_string());
        self
    }
}
