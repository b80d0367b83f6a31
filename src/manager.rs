use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tracing::{debug, info};

use crate::api::CounselApi;
use crate::bus::EventBus;
use crate::flow::state::Phase;
use crate::flow::{FlowController, FlowOptions, FlowSnapshot, IgnoreReason, SubmitOutcome};
use crate::profile::UserProfile;

type SharedController = Arc<AsyncMutex<FlowController>>;
type Inbox = mpsc::UnboundedSender<(String, oneshot::Sender<SubmitOutcome>)>;

#[derive(Clone)]
struct Conversation {
    controller: SharedController,
    inbox: Inbox,
    phase: watch::Receiver<Phase>,
}

/// Owns one flow controller per conversation. User text for a conversation
/// goes through a queue drained by a single task, so answers are applied in
/// the order they arrived.
pub struct Manager {
    api: Arc<dyn CounselApi>,
    event_bus: Arc<EventBus>,
    options: FlowOptions,
    conversations: Mutex<HashMap<String, Conversation>>,
}

impl Manager {
    pub fn new(api: Arc<dyn CounselApi>, event_bus: Arc<EventBus>, options: FlowOptions) -> Self {
        Self {
            api,
            event_bus,
            options,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    fn conversations(&self) -> MutexGuard<'_, HashMap<String, Conversation>> {
        self.conversations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, key: &str) -> Option<Conversation> {
        self.conversations().get(key).cloned()
    }

    /// Opens a conversation. An existing one is restarted with `profile`.
    pub async fn open(&self, key: &str, profile: UserProfile) {
        if let Some(existing) = self.get(key) {
            existing.controller.lock().await.restart_with(profile).await;
            return;
        }

        let controller = FlowController::new(
            key,
            profile,
            self.options,
            self.api.clone(),
            self.event_bus.clone(),
        );
        let phase = controller.watch_phase();
        let controller = Arc::new(AsyncMutex::new(controller));
        let (inbox, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain_inbox(key.to_string(), controller.clone(), rx));

        // Scope the lock so it is dropped before awaiting
        {
            let mut conversations = self.conversations();
            conversations.insert(
                key.to_string(),
                Conversation {
                    controller: controller.clone(),
                    inbox,
                    phase,
                },
            );
        }
        info!("Opened conversation {}", key);

        controller.lock().await.open().await;
    }

    /// Queues user text without waiting for it to be processed. Text that
    /// arrives while a counseling request is in flight is ignored.
    pub fn enqueue(&self, key: &str, text: &str) -> Option<oneshot::Receiver<SubmitOutcome>> {
        let conversation = self.get(key)?;
        let (tx, rx) = oneshot::channel();

        if *conversation.phase.borrow() == Phase::AwaitingResponse {
            debug!("Conversation {} is awaiting a reply, ignoring input", key);
            let _ = tx.send(SubmitOutcome::Ignored(IgnoreReason::Busy));
            return Some(rx);
        }

        if conversation.inbox.send((text.to_string(), tx)).is_err() {
            debug!("Conversation {} inbox is closed", key);
        }
        Some(rx)
    }

    /// Queues user text and waits for its outcome.
    pub async fn submit(&self, key: &str, text: &str) -> Option<SubmitOutcome> {
        let pending = self.enqueue(key, text)?;
        pending.await.ok()
    }

    pub async fn end_session(&self, key: &str) -> bool {
        match self.get(key) {
            Some(conversation) => {
                conversation.controller.lock().await.end_session().await;
                true
            }
            None => false,
        }
    }

    pub async fn restart(&self, key: &str) -> bool {
        match self.get(key) {
            Some(conversation) => {
                conversation.controller.lock().await.restart().await;
                true
            }
            None => false,
        }
    }

    pub async fn snapshot(&self, key: &str) -> Option<FlowSnapshot> {
        let conversation = self.get(key)?;
        let guard = conversation.controller.lock().await;
        Some(guard.snapshot())
    }
}

async fn drain_inbox(
    key: String,
    controller: SharedController,
    mut rx: mpsc::UnboundedReceiver<(String, oneshot::Sender<SubmitOutcome>)>,
) {
    while let Some((text, reply)) = rx.recv().await {
        let outcome = controller.lock().await.submit(&text).await;
        // The caller may not be waiting for the outcome
        let _ = reply.send(outcome);
    }
    debug!("Inbox for conversation {} closed", key);
}
