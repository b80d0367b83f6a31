use crate::{
    bus::{Event, EventBus},
    interface::{next_event, render_event},
    manager::Manager,
    profile::UserProfile,
};
use std::sync::Arc;
use teloxide::{prelude::*, types::ChatAction, utils::command::BotCommands};
use tracing::{error, info, warn};

const KEY_PREFIX: &str = "telegram:";

fn conversation_key(chat_id: ChatId) -> String {
    format!("{}{}", KEY_PREFIX, chat_id.0)
}

fn chat_id_from_key(key: &str) -> Option<ChatId> {
    key.strip_prefix(KEY_PREFIX)?.parse().ok().map(ChatId)
}

#[derive(Clone)]
pub struct TelegramInterface {
    bus: Arc<EventBus>,
    manager: Arc<Manager>,
    token: String,
    whitelist: Arc<Vec<String>>,
}

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "사용할 수 있는 명령어:"
)]
enum Command {
    #[command(description = "새 상담을 시작합니다.")]
    Start,
    #[command(description = "도움말을 표시합니다.")]
    Help,
    #[command(description = "현재 상담을 종료합니다.")]
    End,
    #[command(description = "상담을 처음부터 다시 시작합니다.")]
    Restart,
}

impl TelegramInterface {
    pub fn new(
        bus: Arc<EventBus>,
        manager: Arc<Manager>,
        token: String,
        whitelist: Vec<String>,
    ) -> Self {
        Self {
            bus,
            manager,
            token,
            whitelist: Arc::new(whitelist),
        }
    }

    fn is_allowed(&self, user: Option<&teloxide::types::User>) -> bool {
        if self.whitelist.is_empty() {
            return true;
        }
        let username = user.and_then(|u| u.username.clone()).unwrap_or_default();
        self.whitelist.contains(&username)
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        if self.whitelist.is_empty() {
            warn!("No TELEGRAM_WHITELIST configured. The bot is open to everyone.");
        } else {
            info!("Telegram whitelist loaded: {:?}", self.whitelist);
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(130))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        let bot = Bot::with_client(self.token.clone(), client);
        let interface = self.clone();

        info!("Starting Telegram bot...");

        // Forward counselor bubbles and notifications to their chats
        let mut bus_rx = self.bus.subscribe();
        let bot_clone = bot.clone();
        tokio::spawn(async move {
            while let Some(event) = next_event(&mut bus_rx).await {
                let Some(chat_id) = event.conversation().and_then(chat_id_from_key) else {
                    continue;
                };
                let result = match &event {
                    Event::Typing { active: true, .. } => bot_clone
                        .send_chat_action(chat_id, ChatAction::Typing)
                        .await
                        .map(|_| ()),
                    _ => match render_event(&event) {
                        Some(text) => bot_clone.send_message(chat_id, text).await.map(|_| ()),
                        None => Ok(()),
                    },
                };
                if let Err(e) = result {
                    error!("Failed to send to Telegram chat {}: {}", chat_id.0, e);
                }
            }
        });

        let handler = Update::filter_message()
            .branch(
                dptree::entry()
                    .filter_command::<Command>()
                    .endpoint(answer_command),
            )
            .branch(dptree::entry().endpoint(answer_message));

        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![interface])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}

async fn answer_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    interface: TelegramInterface,
) -> ResponseResult<()> {
    if !interface.is_allowed(msg.from()) {
        bot.send_message(msg.chat.id, "이 봇을 사용할 권한이 없습니다.")
            .await?;
        return Ok(());
    }

    let key = conversation_key(msg.chat.id);
    match cmd {
        Command::Start => {
            bot.send_message(
                msg.chat.id,
                "MindBridge에 오신 것을 환영합니다.\n몇 가지 질문에 답해주시면 상담을 시작할게요.",
            )
            .await?;
            interface.manager.open(&key, UserProfile::guest()).await;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
        Command::End => {
            if !interface.manager.end_session(&key).await {
                bot.send_message(msg.chat.id, "진행 중인 상담이 없습니다. /start 로 시작해주세요.")
                    .await?;
            }
        }
        Command::Restart => {
            if !interface.manager.restart(&key).await {
                interface.manager.open(&key, UserProfile::guest()).await;
            }
        }
    };
    Ok(())
}

async fn answer_message(
    bot: Bot,
    msg: Message,
    interface: TelegramInterface,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if !interface.is_allowed(msg.from()) {
        bot.send_message(msg.chat.id, "이 봇을 사용할 권한이 없습니다.")
            .await?;
        return Ok(());
    }

    // Queued in update order; the turn runs on the conversation's own task
    // so the dispatcher is free for the next update
    let key = conversation_key(msg.chat.id);
    if interface.manager.enqueue(&key, text).is_none() {
        bot.send_message(msg.chat.id, "/start 로 상담을 먼저 시작해주세요.")
            .await?;
    }
    Ok(())
}
