use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: Sender, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(Sender::User, message)
    }

    pub fn ai(message: impl Into<String>) -> Self {
        Self::new(Sender::Ai, message)
    }
}

/// One parsed counselor reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatResult {
    pub emotion: String,
    pub counselor_reply: String,
    pub summary: String,
    pub session_ended: bool,
}
