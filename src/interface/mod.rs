pub mod console;
pub mod telegram;

use crate::bus::{Event, NotificationLevel};
use crate::chat::Sender;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Next bus event for a front end. A listener that fell behind skips the
/// dropped events and keeps going; `None` once the bus is gone.
pub async fn next_event(rx: &mut broadcast::Receiver<Event>) -> Option<Event> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event listener lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Text a chat front end shows for a bus event. User bubbles are echoed by
/// the front end itself, so they render as nothing.
pub fn render_event(event: &Event) -> Option<String> {
    match event {
        Event::Transcript { message, .. } if message.sender == Sender::Ai => {
            Some(message.message.clone())
        }
        Event::Notification { level, message, .. } => {
            let icon = match level {
                NotificationLevel::Info => "ℹ️",
                NotificationLevel::Warning => "⚠️",
                NotificationLevel::Error => "❌",
                NotificationLevel::Success => "✅",
            };
            Some(format!("{} {}", icon, message))
        }
        Event::SessionEnded { summary, .. } => Some(match summary {
            Some(summary) => format!(
                "상담이 종료되었습니다.\n요약: {}\n/restart 로 새 상담을 시작할 수 있어요.",
                summary
            ),
            None => "상담이 종료되었습니다.\n/restart 로 새 상담을 시작할 수 있어요.".to_string(),
        }),
        _ => None,
    }
}
