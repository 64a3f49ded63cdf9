//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Wraps the outbound calls the bot makes so transient network failures are
//! retried with exponential backoff and jitter. Polling is deliberately not
//! wrapped: a failed `getUpdates` stops the bot.

use crate::utils::{retry_telegram_operation, sanitize_file_name};
use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardMarkup, InputFile, Message, MessageId, ParseMode};

/// Send an HTML message with automatic retry on network failures.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<Message> {
    retry_telegram_operation(|| async {
        let mut req = bot
            .send_message(chat_id, text.to_string())
            .parse_mode(ParseMode::Html);
        if let Some(markup) = keyboard.clone() {
            req = req.reply_markup(markup);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Send an audio file with an HTML caption, retrying on network failures.
///
/// The payload is re-uploaded on every attempt.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn send_audio_resilient(
    bot: &Bot,
    chat_id: ChatId,
    title: &str,
    data: &[u8],
    caption: &str,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<Message> {
    let file_name = format!("{}.mp3", sanitize_file_name(title));

    retry_telegram_operation(|| async {
        let file = InputFile::memory(data.to_vec()).file_name(file_name.clone());
        let mut req = bot
            .send_audio(chat_id, file)
            .title(title.to_string())
            .caption(caption.to_string())
            .parse_mode(ParseMode::Html);
        if let Some(markup) = keyboard.clone() {
            req = req.reply_markup(markup);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send audio error: {e}"))
    })
    .await
}

/// Delete a message, retrying on network failures.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn delete_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
) -> Result<()> {
    retry_telegram_operation(|| async {
        bot.delete_message(chat_id, message_id)
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("Telegram delete error: {e}"))
    })
    .await
}
