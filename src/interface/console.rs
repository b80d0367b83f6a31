use crate::{
    bus::{Event, EventBus},
    interface::{next_event, render_event},
    manager::Manager,
    profile::UserProfile,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const CONVERSATION: &str = "console";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    End,
    Restart,
    Status,
    Quit,
    Text(String),
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "/end" => Input::End,
        "/restart" => Input::Restart,
        "/status" => Input::Status,
        "/quit" | "/exit" => Input::Quit,
        other => Input::Text(other.to_string()),
    }
}

pub struct ConsoleInterface {
    bus: Arc<EventBus>,
    manager: Arc<Manager>,
    profile: UserProfile,
}

impl ConsoleInterface {
    pub fn new(bus: Arc<EventBus>, manager: Arc<Manager>, profile: UserProfile) -> Self {
        Self {
            bus,
            manager,
            profile,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        // Spawn renderer before opening so the first question is shown
        let mut bus_rx = self.bus.subscribe();
        tokio::spawn(async move {
            while let Some(event) = next_event(&mut bus_rx).await {
                if event.conversation().is_some_and(|c| c != CONVERSATION) {
                    continue;
                }
                match &event {
                    Event::Typing { active: true, .. } => println!("상담사가 입력 중입니다..."),
                    Event::Emotion { emotion, .. } => info!("Current emotion: {}", emotion),
                    _ => {
                        if let Some(text) = render_event(&event) {
                            println!("상담사> {}", text);
                        }
                    }
                }
            }
        });

        println!("MindBridge 상담을 시작합니다. (/end 종료, /restart 다시 시작, /status 상태, /quit 나가기)");
        self.manager.open(CONVERSATION, self.profile.clone()).await;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match parse_input(&line) {
                Input::Quit => break,
                Input::End => {
                    self.manager.end_session(CONVERSATION).await;
                }
                Input::Restart => {
                    self.manager.restart(CONVERSATION).await;
                }
                Input::Status => {
                    if let Some(snap) = self.manager.snapshot(CONVERSATION).await {
                        println!(
                            "[{:?}] 질문 {}/{}, 감정: {}, 세션: {}",
                            snap.phase,
                            snap.step,
                            snap.plan_len,
                            snap.emotion.as_deref().unwrap_or("-"),
                            snap.session_id.as_deref().unwrap_or("-"),
                        );
                    }
                }
                Input::Text(text) => {
                    self.manager.submit(CONVERSATION, &text).await;
                }
            }
        }

        info!("Console input closed");
        Ok(())
    }
}
