use async_trait::async_trait;
use log::{ error, info };
use std::error::Error;

use crate::markdown::escape_markdown_v2;
use crate::relay::ChatRelay;

/// Sent as plain text so it cannot hit the formatting problem that made the
/// first delivery fail.
pub const DELIVERY_FAILED_REPLY: &str = "⚠️ An error occurred while processing your message.";
pub const RESET_REPLY: &str = "*Conversation has been reset.*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    MarkdownV2,
    /// Telegram's legacy Markdown.
    Markdown,
    Plain,
}

/// Outbound half of the messaging platform, bound to one chat.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, text: &str, format: ReplyFormat) -> Result<(), Box<dyn Error + Send + Sync>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    Text(&'a str),
    Reset,
    Ignored,
}

/// Sorts an incoming text into a chat message, the `/reset` command, or
/// something to ignore (other commands, commands addressed to another bot).
pub fn classify<'a>(text: &'a str, bot_username: Option<&str>) -> Inbound<'a> {
    let Some(command) = text.strip_prefix('/') else {
        return Inbound::Text(text);
    };
    let word = command.split_whitespace().next().unwrap_or("");
    let (name, addressee) = match word.split_once('@') {
        Some((name, addressee)) => (name, Some(addressee)),
        None => (word, None),
    };
    if let (Some(addressee), Some(username)) = (addressee, bot_username) {
        if !addressee.eq_ignore_ascii_case(username) {
            return Inbound::Ignored;
        }
    }
    if name.eq_ignore_ascii_case("reset") {
        Inbound::Reset
    } else {
        Inbound::Ignored
    }
}

pub async fn handle_message(
    relay: &ChatRelay,
    sink: &dyn ReplySink,
    user_id: &str,
    text: &str
) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("User {} sent: {}", user_id, text);

    let reply = relay.converse(user_id, text).await;
    let escaped = escape_markdown_v2(&reply);

    if let Err(e) = sink.send(&escaped, ReplyFormat::MarkdownV2).await {
        error!("Failed to send message to user {}: {}", user_id, e);
        sink.send(DELIVERY_FAILED_REPLY, ReplyFormat::Plain).await?;
    }
    Ok(())
}

/// The in-memory reset always takes effect; a failed save is logged and the
/// user is still told the conversation was reset.
pub async fn handle_reset(
    relay: &ChatRelay,
    sink: &dyn ReplySink,
    user_id: &str
) -> Result<(), Box<dyn Error + Send + Sync>> {
    if let Err(e) = relay.reset(user_id).await {
        error!("Failed to persist reset for user {}: {}", user_id, e);
    }
    sink.send(RESET_REPLY, ReplyFormat::Markdown).await?;
    info!("User {} reset their conversation.", user_id);
    Ok(())
}
