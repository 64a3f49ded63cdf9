//! Small helpers shared by the bot and the extractor.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

/// Longest file stem produced by [`sanitize_file_name`], in characters.
const MAX_FILE_STEM_CHARS: usize = 120;

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use audio_archive_bot::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Turns a media title into a file stem that is safe to place in a directory.
///
/// Path separators, characters reserved on common filesystems and control
/// characters become `_`. Leading dots are stripped so the result is never
/// hidden or a relative path component.
///
/// # Examples
///
/// ```
/// use audio_archive_bot::utils::sanitize_file_name;
/// assert_eq!(sanitize_file_name("AC/DC: Back in Black"), "AC_DC_ Back in Black");
/// assert_eq!(sanitize_file_name("..."), "audio");
/// ```
#[must_use]
pub fn sanitize_file_name(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_start_matches('.').trim();
    if trimmed.is_empty() {
        return "audio".to_string();
    }
    truncate_str(trimmed, MAX_FILE_STEM_CHARS)
}

/// Retry a Telegram API operation with exponential backoff.
///
/// Used for outbound replies only. Polling for updates is never retried.
///
/// The retry strategy uses exponential backoff with jitter:
/// - Initial delay: 500ms
/// - Max delay: 4s
/// - Max attempts: 3 (configurable via constants in `config.rs`)
///
/// # Errors
///
/// Returns the last error if all attempts fail.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}
