use crate::chat::ChatMessage;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A bubble was appended to a conversation's transcript
    Transcript {
        conversation: String,
        message: ChatMessage,
    },

    /// The transcript was cleared by a restart
    TranscriptCleared { conversation: String },

    /// A counseling request started or finished
    Typing { conversation: String, active: bool },

    /// Emotion tag from the latest counselor reply
    Emotion {
        conversation: String,
        emotion: String,
    },

    /// A transient notification (toast)
    Notification {
        level: NotificationLevel,
        message: String,
        target: Option<String>, // If None, broadcast to everyone
    },

    /// The counseling session reached its terminal state
    SessionEnded {
        conversation: String,
        summary: Option<String>,
    },
}

impl Event {
    /// Conversation the event belongs to, `None` for broadcasts.
    pub fn conversation(&self) -> Option<&str> {
        match self {
            Event::Transcript { conversation, .. }
            | Event::TranscriptCleared { conversation }
            | Event::Typing { conversation, .. }
            | Event::Emotion { conversation, .. }
            | Event::SessionEnded { conversation, .. } => Some(conversation),
            Event::Notification { target, .. } => target.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // We ignore the error if there are no receivers
        let _ = self.tx.send(event);
    }

    pub fn notify(&self, target: &str, level: NotificationLevel, message: impl Into<String>) {
        self.publish(Event::Notification {
            level,
            message: message.into(),
            target: Some(target.to_string()),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
