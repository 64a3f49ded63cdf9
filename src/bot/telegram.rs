//! Telegram Bot API adapter for the consumer seams.

use super::commands::Command;
use super::listener::Event;
use super::reply::{Button, Reply};
use super::resilient::{delete_message_resilient, send_audio_resilient, send_message_resilient};
use super::transport::{IncomingUpdate, ReplySink, TransportError, UpdateSource};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, Update,
    UpdateKind, User,
};
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

/// Polls and replies through a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
    poll_timeout_secs: u32,
}

impl TelegramTransport {
    /// Wrap `bot`, long-polling for `poll_timeout_secs` per request
    #[must_use]
    pub const fn new(bot: Bot, poll_timeout_secs: u32) -> Self {
        Self {
            bot,
            poll_timeout_secs,
        }
    }

    /// Publish the command list shown in Telegram clients.
    ///
    /// # Errors
    ///
    /// Returns an error if the `setMyCommands` request fails.
    pub async fn register_commands(&self) -> Result<(), TransportError> {
        self.bot
            .set_my_commands(Command::bot_commands())
            .await
            .map_err(|source| TransportError::Request {
                operation: "setMyCommands",
                source,
            })?;
        info!("Bot commands registered");
        Ok(())
    }

    async fn to_incoming(&self, update: Update) -> IncomingUpdate {
        let id = update.id.0.cast_signed();
        let event = match update.kind {
            UpdateKind::Message(msg) => match (msg.text(), username_of(msg.from.as_ref())) {
                (Some(text), Some(username)) => Some(Event::Message {
                    chat_id: msg.chat.id.0,
                    message_id: msg.id.0,
                    username,
                    text: text.to_string(),
                }),
                _ => None,
            },
            UpdateKind::CallbackQuery(q) => {
                // Stop the client's loading spinner before any slow work
                if let Err(e) = self.bot.answer_callback_query(q.id.clone()).await {
                    warn!(update_id = id, error = %e, "Failed to answer callback query");
                }
                match (q.message.as_ref(), q.data.clone(), username_of(Some(&q.from))) {
                    (Some(msg), Some(data), Some(username)) => Some(Event::Callback {
                        chat_id: msg.chat().id.0,
                        message_id: msg.id().0,
                        username,
                        data,
                    }),
                    _ => None,
                }
            }
            _ => None,
        };

        IncomingUpdate { id, event }
    }
}

/// Archive key for a Telegram user.
fn username_of(user: Option<&User>) -> Option<String> {
    let user = user?;
    Some(archive_key(user.id.0, user.username.as_deref()))
}

/// The username, or `#<numeric id>` when the account has none. `#` never
/// appears in Telegram usernames, so the two forms cannot collide.
fn archive_key(user_id: u64, username: Option<&str>) -> String {
    username.map_or_else(|| format!("#{user_id}"), str::to_string)
}

fn keyboard(buttons: &[Button]) -> Option<InlineKeyboardMarkup> {
    if buttons.is_empty() {
        return None;
    }
    Some(InlineKeyboardMarkup::new(buttons.iter().map(|b| {
        vec![InlineKeyboardButton::callback(b.label.clone(), b.data.clone())]
    })))
}

#[async_trait]
impl UpdateSource for TelegramTransport {
    async fn fetch(&self, offset: i32, limit: u8) -> Result<Vec<IncomingUpdate>, TransportError> {
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .limit(limit)
            .timeout(self.poll_timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .await
            .map_err(|source| TransportError::Request {
                operation: "getUpdates",
                source,
            })?;

        if !updates.is_empty() {
            debug!(offset, count = updates.len(), "Fetched updates");
        }

        let mut incoming = Vec::with_capacity(updates.len());
        for update in updates {
            incoming.push(self.to_incoming(update).await);
        }
        Ok(incoming)
    }
}

#[async_trait]
impl ReplySink for TelegramTransport {
    async fn deliver(&self, reply: Reply) -> Result<(), TransportError> {
        match reply {
            Reply::Text {
                chat_id,
                text,
                buttons,
            } => send_message_resilient(&self.bot, ChatId(chat_id), &text, keyboard(&buttons))
                .await
                .map(|_| ())
                .map_err(|e| failed("sendMessage", &e)),
            Reply::Audio {
                chat_id,
                title,
                data,
                caption,
                buttons,
            } => send_audio_resilient(
                &self.bot,
                ChatId(chat_id),
                &title,
                &data,
                &caption,
                keyboard(&buttons),
            )
            .await
            .map(|_| ())
            .map_err(|e| failed("sendAudio", &e)),
            Reply::Delete {
                chat_id,
                message_id,
            } => delete_message_resilient(&self.bot, ChatId(chat_id), MessageId(message_id))
                .await
                .map_err(|e| failed("deleteMessage", &e)),
        }
    }
}

fn failed(operation: &'static str, error: &anyhow::Error) -> TransportError {
    TransportError::Failed {
        operation,
        reason: format!("{error:#}"),
    }
}
