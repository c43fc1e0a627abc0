//! Queued user actions.
//!
//! Mutations attempted while offline are expressed as data, not calls,
//! so they can be persisted and replayed when connectivity returns. The
//! payload is a tagged sum type and the dispatch site matches on it
//! exhaustively; adding an action kind is a compile-checked change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionPayload {
    Vote {
        poll_id: String,
        option_id: String,
        user_id: String,
    },
    Follow {
        payload: Value,
    },
    Calculation {
        payload: Value,
    },
    Favorite {
        payload: Value,
    },
    Feedback {
        payload: Value,
    },
}

impl ActionPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionPayload::Vote { .. } => "vote",
            ActionPayload::Follow { .. } => "follow",
            ActionPayload::Calculation { .. } => "calculation",
            ActionPayload::Favorite { .. } => "favorite",
            ActionPayload::Feedback { .. } => "feedback",
        }
    }
}

/// One entry in the persisted offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAction {
    /// Unique id: kind, enqueue time in millis, random suffix.
    pub id: String,
    pub action: ActionPayload,
    pub enqueued_at: DateTime<Utc>,
    /// Failed delivery attempts so far. The queue drops the action for
    /// good once this reaches the configured limit.
    pub retry_count: u32,
}

impl OfflineAction {
    pub fn new(action: ActionPayload) -> Self {
        let now = Utc::now();
        let id = format!(
            "{}_{}_{:04x}",
            action.kind(),
            now.timestamp_millis(),
            rand::random::<u16>()
        );
        Self {
            id,
            action,
            enqueued_at: now,
            retry_count: 0,
        }
    }
}
