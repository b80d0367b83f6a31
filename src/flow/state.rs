use crate::chat::{ChatMessage, ChatResult};
use crate::profile::{IntakeField, IntakeForm, UserProfile};
use crate::prompt::system_prompt;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    CollectingIntake,
    ReadyForChat,
    AwaitingResponse,
    SessionEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowOptions {
    pub auto_start_from_profile: bool,
}

/// One counseling request to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub system_prompt: String,
    pub user_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Empty,
    Busy,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Ignored(IgnoreReason),
    /// An intake answer was recorded and the next question asked.
    Recorded,
    /// A counseling request must be sent.
    Dispatch(Turn),
}

/// Transcript and intake state. Performs no I/O.
#[derive(Debug, Clone)]
pub struct FlowState {
    profile: UserProfile,
    options: FlowOptions,
    plan: Vec<IntakeField>,
    form: IntakeForm,
    step: usize,
    phase: Phase,
    transcript: Vec<ChatMessage>,
    session_id: Option<String>,
    emotion: Option<String>,
    summary: Option<String>,
}

impl FlowState {
    pub fn new(profile: UserProfile, options: FlowOptions) -> Self {
        let form = IntakeForm::from_profile(&profile);
        let plan = if options.auto_start_from_profile && profile.is_complete() {
            Vec::new()
        } else {
            IntakeField::ALL
                .into_iter()
                .filter(|f| !form.is_filled(*f))
                .collect()
        };
        let phase = initial_phase(&plan);

        Self {
            profile,
            options,
            plan,
            form,
            step: 0,
            phase,
            transcript: Vec::new(),
            session_id: None,
            emotion: None,
            summary: None,
        }
    }

    /// Appends the opening bubble. Returns true when the opening counseling
    /// turn should be issued without waiting for user input.
    pub fn seed(&mut self) -> bool {
        match self.plan.first() {
            Some(first) => {
                self.transcript.push(ChatMessage::ai(first.question()));
                false
            }
            None => {
                self.transcript.push(ChatMessage::ai(self.intro_message()));
                self.options.auto_start_from_profile
            }
        }
    }

    fn intro_message(&self) -> String {
        match self.form.name.as_deref() {
            Some(name) => format!(
                "안녕하세요, {}님. 프로필 정보를 바탕으로 상담을 시작할게요.",
                name
            ),
            None => "안녕하세요. 편하게 이야기를 시작해주세요.".to_string(),
        }
    }

    pub fn accept(&mut self, text: &str) -> Submission {
        let text = text.trim();
        if text.is_empty() {
            return Submission::Ignored(IgnoreReason::Empty);
        }

        match self.phase {
            Phase::AwaitingResponse => Submission::Ignored(IgnoreReason::Busy),
            Phase::SessionEnded => Submission::Ignored(IgnoreReason::Ended),
            Phase::CollectingIntake => {
                self.form.record(self.plan[self.step], text);
                self.transcript.push(ChatMessage::user(text));
                self.step += 1;

                match self.plan.get(self.step) {
                    Some(next) => {
                        self.transcript.push(ChatMessage::ai(next.question()));
                        Submission::Recorded
                    }
                    None => {
                        self.phase = Phase::AwaitingResponse;
                        Submission::Dispatch(self.turn(String::new()))
                    }
                }
            }
            Phase::ReadyForChat => {
                self.transcript.push(ChatMessage::user(text));
                self.phase = Phase::AwaitingResponse;
                Submission::Dispatch(self.turn(text.to_string()))
            }
        }
    }

    /// Opening turn for the auto-start path.
    pub fn begin_opening_turn(&mut self) -> Option<Turn> {
        if self.phase != Phase::ReadyForChat {
            return None;
        }
        self.phase = Phase::AwaitingResponse;
        Some(self.turn(String::new()))
    }

    fn turn(&self, user_message: String) -> Turn {
        Turn {
            system_prompt: system_prompt(&self.form),
            user_message,
        }
    }

    /// Applies a counselor reply. Returns the appended AI bubble, if any.
    pub fn apply_reply(&mut self, result: ChatResult) -> Option<ChatMessage> {
        let bubble = if result.counselor_reply.trim().is_empty() {
            None
        } else {
            let msg = ChatMessage::ai(result.counselor_reply);
            self.transcript.push(msg.clone());
            Some(msg)
        };
        if !result.emotion.is_empty() {
            self.emotion = Some(result.emotion);
        }
        if !result.summary.is_empty() {
            self.summary = Some(result.summary);
        }
        self.phase = if result.session_ended {
            Phase::SessionEnded
        } else {
            Phase::ReadyForChat
        };
        bubble
    }

    pub fn fail_turn(&mut self) {
        if self.phase == Phase::AwaitingResponse {
            self.phase = Phase::ReadyForChat;
        }
    }

    pub fn end(&mut self) {
        self.phase = Phase::SessionEnded;
    }

    pub fn reset(&mut self) {
        self.reset_with(self.profile.clone());
    }

    /// Resets to the initial state for a different profile.
    pub fn reset_with(&mut self, profile: UserProfile) {
        *self = Self::new(profile, self.options);
    }

    pub fn set_session_id(&mut self, session_id: String) {
        self.session_id = Some(session_id);
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn plan(&self) -> &[IntakeField] {
        &self.plan
    }

    pub fn form(&self) -> &IntakeForm {
        &self.form
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn emotion(&self) -> Option<&str> {
        self.emotion.as_deref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }
}

fn initial_phase(plan: &[IntakeField]) -> Phase {
    if plan.is_empty() {
        Phase::ReadyForChat
    } else {
        Phase::CollectingIntake
    }
}
