use crate::api::wire::{ChatMessageParams, CounsellingRecord};
use crate::api::CounselApi;
use crate::bus::{Event, EventBus, NotificationLevel};
use crate::chat::{ChatMessage, ChatResult};
use crate::error::FlowError;
use crate::flow::state::{FlowOptions, FlowState, IgnoreReason, Phase, Submission, Turn};
use crate::profile::UserProfile;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Read-only view of a conversation for front ends.
#[derive(Debug, Clone, Serialize)]
pub struct FlowSnapshot {
    pub phase: Phase,
    pub step: usize,
    pub plan_len: usize,
    pub transcript: Vec<ChatMessage>,
    pub emotion: Option<String>,
    pub session_id: Option<String>,
}

/// Outcome of a submit, after any counseling turn it triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Ignored(IgnoreReason),
    Recorded,
    Replied,
    Failed,
}

pub struct FlowController {
    conversation: String,
    state: FlowState,
    api: Arc<dyn CounselApi>,
    bus: Arc<EventBus>,
    phase_tx: watch::Sender<Phase>,
}

impl FlowController {
    pub fn new(
        conversation: impl Into<String>,
        profile: UserProfile,
        options: FlowOptions,
        api: Arc<dyn CounselApi>,
        bus: Arc<EventBus>,
    ) -> Self {
        let state = FlowState::new(profile, options);
        let (phase_tx, _) = watch::channel(state.phase());
        Self {
            conversation: conversation.into(),
            state,
            api,
            bus,
            phase_tx,
        }
    }

    /// Follows the phase without taking the controller lock.
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    fn sync_phase(&self) {
        self.phase_tx.send_replace(self.state.phase());
    }

    /// Seeds the transcript, running the opening turn on the auto-start path.
    pub async fn open(&mut self) {
        let before = self.state.transcript().len();
        let auto_start = self.state.seed();
        self.publish_since(before);

        if auto_start {
            if let Some(turn) = self.state.begin_opening_turn() {
                info!("[{}] Auto-starting counseling from profile", self.conversation);
                self.sync_phase();
                self.run_turn(turn).await;
            }
        }
        self.sync_phase();
    }

    pub async fn submit(&mut self, text: &str) -> SubmitOutcome {
        let before = self.state.transcript().len();
        let submission = self.state.accept(text);
        self.sync_phase();
        self.publish_since(before);

        match submission {
            Submission::Ignored(reason) => SubmitOutcome::Ignored(reason),
            Submission::Recorded => SubmitOutcome::Recorded,
            Submission::Dispatch(turn) => self.run_turn(turn).await,
        }
    }

    async fn run_turn(&mut self, turn: Turn) -> SubmitOutcome {
        self.set_typing(true);
        let result = self.exchange(turn).await;
        self.set_typing(false);

        match result {
            Ok(reply) => {
                let ended = reply.session_ended;
                if let Some(bubble) = self.state.apply_reply(reply) {
                    self.publish_message(bubble);
                }
                self.sync_phase();
                if let Some(emotion) = self.state.emotion() {
                    self.bus.publish(Event::Emotion {
                        conversation: self.conversation.clone(),
                        emotion: emotion.to_string(),
                    });
                }
                if ended {
                    info!("[{}] Backend closed the session", self.conversation);
                    self.finish().await;
                }
                SubmitOutcome::Replied
            }
            Err(e) => {
                error!("[{}] {}", self.conversation, e);
                self.state.fail_turn();
                self.sync_phase();
                self.bus
                    .notify(&self.conversation, NotificationLevel::Error, e.user_message());
                SubmitOutcome::Failed
            }
        }
    }

    async fn exchange(&mut self, turn: Turn) -> Result<ChatResult, FlowError> {
        let session_id = match self.state.session_id().map(str::to_string) {
            Some(id) => id,
            None => {
                let email = self.state.profile().email.clone();
                let id = self
                    .api
                    .start_session(email.as_deref())
                    .await
                    .map_err(FlowError::SessionStart)?;
                info!("[{}] Counseling session {} started", self.conversation, id);
                self.state.set_session_id(id.clone());
                id
            }
        };

        self.api
            .send_message(ChatMessageParams {
                system_prompt: turn.system_prompt,
                session_id,
                user_message: turn.user_message,
            })
            .await
            .map_err(FlowError::Counsel)
    }

    /// Ends the session at the user's request.
    pub async fn end_session(&mut self) {
        if self.state.phase() == Phase::SessionEnded {
            return;
        }
        self.state.end();
        self.sync_phase();
        self.finish().await;
    }

    async fn finish(&mut self) {
        let summary = self.state.summary().map(str::to_string);

        if let Some(session_id) = self.state.session_id() {
            if let Err(e) = self
                .api
                .complete_session(session_id, summary.as_deref().unwrap_or_default())
                .await
            {
                warn!("[{}] Failed to complete session {}: {}", self.conversation, session_id, e);
            }
        }

        let record = CounsellingRecord {
            email: self.state.profile().email.clone(),
            summary: summary.clone(),
            form: self.state.form().to_wire(),
        };
        if let Err(e) = self.api.save_counselling(&record).await {
            warn!("[{}] Failed to save counselling record: {}", self.conversation, e);
        }

        self.bus.publish(Event::SessionEnded {
            conversation: self.conversation.clone(),
            summary,
        });
    }

    pub async fn restart(&mut self) {
        let profile = self.state.profile().clone();
        self.restart_with(profile).await;
    }

    /// Restarts with a replacement profile, e.g. after the user logged in.
    pub async fn restart_with(&mut self, profile: UserProfile) {
        info!("[{}] Restarting conversation", self.conversation);
        self.state.reset_with(profile);
        self.bus.publish(Event::TranscriptCleared {
            conversation: self.conversation.clone(),
        });
        self.open().await;
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            phase: self.state.phase(),
            step: self.state.step(),
            plan_len: self.state.plan().len(),
            transcript: self.state.transcript().to_vec(),
            emotion: self.state.emotion().map(str::to_string),
            session_id: self.state.session_id().map(str::to_string),
        }
    }

    fn set_typing(&self, active: bool) {
        self.bus.publish(Event::Typing {
            conversation: self.conversation.clone(),
            active,
        });
    }

    fn publish_since(&self, before: usize) {
        for message in &self.state.transcript()[before..] {
            self.publish_message(message.clone());
        }
    }

    fn publish_message(&self, message: ChatMessage) {
        self.bus.publish(Event::Transcript {
            conversation: self.conversation.clone(),
            message,
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chat::Sender;
    use crate::error::ApiError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Start(Option<String>),
        Message { session_id: String, user_message: String },
        Complete { session_id: String, summary: String },
        Save(Option<String>),
    }

    /// Scripted backend that records every call.
    #[derive(Default)]
    pub struct FakeApi {
        pub calls: Mutex<Vec<Call>>,
        pub replies: Mutex<VecDeque<Result<ChatResult, ()>>>,
        pub fail_start: Mutex<bool>,
        pub fail_persist: bool,
    }

    impl FakeApi {
        pub fn with_replies(replies: Vec<Result<ChatResult, ()>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn status() -> ApiError {
            ApiError::Status {
                status: 503,
                body: "unavailable".into(),
            }
        }
    }

    #[async_trait]
    impl CounselApi for FakeApi {
        async fn start_session(&self, email: Option<&str>) -> Result<String, ApiError> {
            self.calls.lock().unwrap().push(Call::Start(email.map(String::from)));
            if *self.fail_start.lock().unwrap() {
                return Err(ApiError::MissingSessionId);
            }
            Ok("ses-1".to_string())
        }

        async fn send_message(&self, params: ChatMessageParams) -> Result<ChatResult, ApiError> {
            self.calls.lock().unwrap().push(Call::Message {
                session_id: params.session_id,
                user_message: params.user_message,
            });
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                _ => Err(Self::status()),
            }
        }

        async fn complete_session(&self, session_id: &str, summary: &str) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(Call::Complete {
                session_id: session_id.to_string(),
                summary: summary.to_string(),
            });
            if self.fail_persist {
                return Err(Self::status());
            }
            Ok(())
        }

        async fn save_counselling(&self, record: &CounsellingRecord) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(Call::Save(record.summary.clone()));
            if self.fail_persist {
                return Err(Self::status());
            }
            Ok(())
        }
    }

    pub fn reply(text: &str, ended: bool) -> ChatResult {
        ChatResult {
            emotion: "불안".into(),
            counselor_reply: text.into(),
            summary: "수면 문제 상담".into(),
            session_ended: ended,
        }
    }

    fn controller(api: Arc<FakeApi>, profile: UserProfile, auto_start: bool) -> (FlowController, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let controller = FlowController::new(
            "c1",
            profile,
            FlowOptions { auto_start_from_profile: auto_start },
            api,
            bus.clone(),
        );
        (controller, bus)
    }

    async fn answer_intake(c: &mut FlowController) -> SubmitOutcome {
        let mut last = SubmitOutcome::Recorded;
        for answer in ["민수", "남성", "24", "불안해요", "잠을 못 자요", "없어요"] {
            last = c.submit(answer).await;
        }
        last
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn first_answer_appends_user_and_next_question() {
        let api = Arc::new(FakeApi::default());
        let (mut c, _bus) = controller(api.clone(), UserProfile::guest(), false);
        c.open().await;

        assert_eq!(c.submit("민수").await, SubmitOutcome::Recorded);
        let snap = c.snapshot();
        let tail: Vec<_> = snap.transcript[1..].iter().map(|m| (m.sender, m.message.as_str())).collect();
        assert_eq!(tail, vec![(Sender::User, "민수"), (Sender::Ai, "성별을 입력해주세요.")]);
        assert_eq!(snap.step, 1);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn completed_intake_appends_one_ai_bubble() {
        let api = Arc::new(FakeApi::with_replies(vec![Ok(reply("안녕하세요 민수님...", false))]));
        let (mut c, _bus) = controller(api.clone(), UserProfile::guest(), false);
        c.open().await;

        let before = 1 + 6 * 2 - 1;
        assert_eq!(answer_intake(&mut c).await, SubmitOutcome::Replied);

        let snap = c.snapshot();
        assert_eq!(snap.transcript.len(), before + 1);
        let last = snap.transcript.last().unwrap();
        assert_eq!(last.sender, Sender::Ai);
        assert_eq!(last.message, "안녕하세요 민수님...");
        assert_eq!(snap.phase, Phase::ReadyForChat);
        assert_eq!(snap.step, 6);
        assert_eq!(
            api.calls(),
            vec![
                Call::Start(None),
                Call::Message {
                    session_id: "ses-1".into(),
                    user_message: String::new()
                }
            ]
        );
    }

    #[tokio::test]
    async fn backend_failure_notifies_and_stays_usable() {
        let api = Arc::new(FakeApi::with_replies(vec![Err(()), Ok(reply("다시 연결됐어요", false))]));
        let (mut c, bus) = controller(api.clone(), UserProfile::guest(), false);
        let mut rx = bus.subscribe();
        c.open().await;

        assert_eq!(answer_intake(&mut c).await, SubmitOutcome::Failed);
        let snap = c.snapshot();
        assert_eq!(snap.phase, Phase::ReadyForChat);
        assert_eq!(snap.transcript.last().unwrap().sender, Sender::User);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            Event::Notification { level: NotificationLevel::Error, .. }
        )));
        assert!(matches!(
            events.last(),
            Some(Event::Notification { .. })
        ));
        let typing: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                Event::Typing { active, .. } => Some(*active),
                _ => None,
            })
            .collect();
        assert_eq!(typing, vec![true, false]);

        assert_eq!(c.submit("다시 해볼게요").await, SubmitOutcome::Replied);
        assert_eq!(c.snapshot().transcript.last().unwrap().message, "다시 연결됐어요");
    }

    #[tokio::test]
    async fn session_start_failure_aborts_before_message_call() {
        let api = Arc::new(FakeApi::with_replies(vec![Ok(reply("안녕하세요", false))]));
        *api.fail_start.lock().unwrap() = true;
        let (mut c, _bus) = controller(api.clone(), UserProfile::guest(), false);
        c.open().await;

        assert_eq!(answer_intake(&mut c).await, SubmitOutcome::Failed);
        assert_eq!(api.calls(), vec![Call::Start(None)]);
        assert_eq!(c.snapshot().phase, Phase::ReadyForChat);
        assert_eq!(c.snapshot().session_id, None);

        *api.fail_start.lock().unwrap() = false;
        assert_eq!(c.submit("재시도").await, SubmitOutcome::Replied);
        assert_eq!(c.snapshot().session_id.as_deref(), Some("ses-1"));
    }

    #[tokio::test]
    async fn backend_end_flag_blocks_further_submits() {
        let api = Arc::new(FakeApi::with_replies(vec![
            Ok(reply("반가워요", false)),
            Ok(reply("오늘 상담은 여기까지 할게요", true)),
        ]));
        let (mut c, bus) = controller(api.clone(), UserProfile::guest(), false);
        let mut rx = bus.subscribe();
        c.open().await;
        answer_intake(&mut c).await;

        assert_eq!(c.submit("이제 괜찮아요").await, SubmitOutcome::Replied);
        assert_eq!(c.snapshot().phase, Phase::SessionEnded);
        assert!(drain(&mut rx).iter().any(|e| matches!(e, Event::SessionEnded { .. })));

        let len = c.snapshot().transcript.len();
        assert_eq!(c.submit("하나 더").await, SubmitOutcome::Ignored(IgnoreReason::Ended));
        assert_eq!(c.snapshot().transcript.len(), len);

        let calls = api.calls();
        assert!(calls.contains(&Call::Complete {
            session_id: "ses-1".into(),
            summary: "수면 문제 상담".into()
        }));
        assert_eq!(calls.last(), Some(&Call::Save(Some("수면 문제 상담".into()))));
    }

    #[tokio::test]
    async fn end_session_swallows_persistence_failures() {
        let api = Arc::new(FakeApi {
            replies: Mutex::new(vec![Ok(reply("반가워요", false))].into()),
            fail_persist: true,
            ..Default::default()
        });
        let (mut c, bus) = controller(api.clone(), UserProfile::guest(), false);
        let mut rx = bus.subscribe();
        c.open().await;
        answer_intake(&mut c).await;
        drain(&mut rx);

        c.end_session().await;
        assert_eq!(c.snapshot().phase, Phase::SessionEnded);
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, Event::Notification { .. })));
        assert!(matches!(events.last(), Some(Event::SessionEnded { .. })));

        c.end_session().await;
        let completes = api.calls().iter().filter(|call| matches!(call, Call::Complete { .. })).count();
        assert_eq!(completes, 1);
    }

    #[tokio::test]
    async fn end_without_session_skips_complete() {
        let api = Arc::new(FakeApi::default());
        let (mut c, _bus) = controller(api.clone(), UserProfile::guest(), false);
        c.open().await;
        c.submit("민수").await;

        c.end_session().await;
        assert_eq!(api.calls(), vec![Call::Save(None)]);
        assert_eq!(c.submit("남성").await, SubmitOutcome::Ignored(IgnoreReason::Ended));
    }

    #[tokio::test]
    async fn restart_returns_to_opening_state() {
        let api = Arc::new(FakeApi::with_replies(vec![Ok(reply("반가워요", true))]));
        let (mut c, _bus) = controller(api.clone(), UserProfile::guest(), false);
        c.open().await;
        let opening = c.snapshot();

        answer_intake(&mut c).await;
        assert_eq!(c.snapshot().phase, Phase::SessionEnded);

        for _ in 0..2 {
            c.restart().await;
            let snap = c.snapshot();
            assert_eq!(snap.phase, opening.phase);
            assert_eq!(snap.step, 0);
            assert_eq!(snap.session_id, None);
            assert_eq!(snap.emotion, None);
            let texts: Vec<_> = snap.transcript.iter().map(|m| m.message.clone()).collect();
            let expected: Vec<_> = opening.transcript.iter().map(|m| m.message.clone()).collect();
            assert_eq!(texts, expected);
        }
        assert_eq!(c.submit("민수").await, SubmitOutcome::Recorded);
    }

    #[tokio::test]
    async fn complete_profile_auto_starts() {
        let profile = UserProfile {
            email: Some("minsu@example.com".into()),
            name: Some("민수".into()),
            gender: Some("남성".into()),
            age: Some(24),
            current_state: Some("불안".into()),
        };
        let api = Arc::new(FakeApi::with_replies(vec![Ok(reply("민수님, 오늘 어떠셨어요?", false))]));
        let (mut c, _bus) = controller(api.clone(), profile, true);
        c.open().await;

        let snap = c.snapshot();
        assert_eq!(snap.plan_len, 0);
        assert_eq!(snap.phase, Phase::ReadyForChat);
        assert_eq!(snap.transcript.len(), 2);
        assert_eq!(snap.transcript[1].message, "민수님, 오늘 어떠셨어요?");
        assert_eq!(snap.emotion.as_deref(), Some("불안"));
        assert_eq!(
            api.calls(),
            vec![
                Call::Start(Some("minsu@example.com".into())),
                Call::Message {
                    session_id: "ses-1".into(),
                    user_message: String::new()
                }
            ]
        );
    }

    #[tokio::test]
    async fn free_text_age_advances_without_warning() {
        let api = Arc::new(FakeApi::default());
        let (mut c, bus) = controller(api, UserProfile::guest(), false);
        let mut rx = bus.subscribe();
        c.open().await;
        c.submit("민수").await;
        c.submit("남성").await;
        drain(&mut rx);

        assert_eq!(c.submit("스물네 살").await, SubmitOutcome::Recorded);
        assert_eq!(c.snapshot().step, 3);
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, Event::Notification { .. })));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn phase_watch_tracks_turns() {
        let api = Arc::new(FakeApi::with_replies(vec![Ok(reply("반가워요", true))]));
        let (mut c, _bus) = controller(api, UserProfile::guest(), false);
        let phase = c.watch_phase();
        c.open().await;
        assert_eq!(*phase.borrow(), Phase::CollectingIntake);

        answer_intake(&mut c).await;
        assert_eq!(*phase.borrow(), Phase::SessionEnded);

        c.restart().await;
        assert_eq!(*phase.borrow(), Phase::CollectingIntake);
    }

    #[tokio::test]
    async fn restart_with_profile_replaces_intake_plan() {
        let api = Arc::new(FakeApi::default());
        let (mut c, _bus) = controller(api, UserProfile::guest(), false);
        c.open().await;
        c.submit("민수").await;

        c.restart_with(UserProfile {
            name: Some("지은".into()),
            ..Default::default()
        })
        .await;
        let snap = c.snapshot();
        assert_eq!(snap.plan_len, 5);
        assert_eq!(snap.transcript.len(), 1);
        assert_eq!(snap.transcript[0].message, "성별을 입력해주세요.");
    }
}
