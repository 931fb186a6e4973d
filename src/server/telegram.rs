use async_trait::async_trait;
use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ BotCommand, ParseMode };

use super::handlers::{ self, Inbound, ReplyFormat, ReplySink };
use crate::relay::ChatRelay;

pub struct TelegramReplySink {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramReplySink {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

#[async_trait]
impl ReplySink for TelegramReplySink {
    async fn send(&self, text: &str, format: ReplyFormat) -> Result<(), Box<dyn Error + Send + Sync>> {
        let request = self.bot.send_message(self.chat_id, text);
        let request = match format {
            ReplyFormat::MarkdownV2 => request.parse_mode(ParseMode::MarkdownV2),
            #[allow(deprecated)]
            ReplyFormat::Markdown => request.parse_mode(ParseMode::Markdown),
            ReplyFormat::Plain => request,
        };
        request.await?;
        Ok(())
    }
}

struct BotState {
    relay: Arc<ChatRelay>,
    username: Option<String>,
}

pub async fn start_polling(
    token: &str,
    relay: Arc<ChatRelay>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let bot = Bot::new(token);
    let me = bot.get_me().await?;
    let username = me.user.username.clone();
    info!("Authorized on Telegram as @{}", username.as_deref().unwrap_or("<unnamed>"));

    let commands = [BotCommand::new("reset", "Forget the conversation and start over")];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("Failed to set Telegram bot commands: {}", e);
    }

    let state = Arc::new(BotState { relay, username });
    let handler = Update::filter_message().endpoint(handle_update);

    info!("Bot started.");
    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch().await;

    Ok(())
}

async fn handle_update(
    bot: Bot,
    msg: Message,
    state: Arc<BotState>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let (Some(user), Some(text)) = (msg.from.as_ref(), msg.text()) else {
        return Ok(());
    };
    let user_id = user.id.0.to_string();
    let sink = TelegramReplySink::new(bot, msg.chat.id);

    match handlers::classify(text, state.username.as_deref()) {
        Inbound::Text(text) => handlers::handle_message(&state.relay, &sink, &user_id, text).await,
        Inbound::Reset => handlers::handle_reset(&state.relay, &sink, &user_id).await,
        Inbound::Ignored => Ok(()),
    }
}
