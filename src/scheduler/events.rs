//! Per-task status events

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Lifecycle of one compilation task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTaskStatus {
    Queued,
    Started,
    Succeeded,
    Failed,
}

impl BuildTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// A status transition, published on the scheduler's broadcast channel
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildEvent {
    pub file: PathBuf,
    pub status: BuildTaskStatus,
    /// Peer handling the task, once started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

impl BuildEvent {
    pub fn new(file: PathBuf, status: BuildTaskStatus) -> Self {
        Self {
            file,
            status,
            node_id: None,
            message: None,
            at: Utc::now(),
        }
    }

    pub fn on_node(mut self, node_id: &str) -> Self {
        self.node_id = Some(node_id.to_string());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
