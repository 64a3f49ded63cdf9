//! User-facing texts and buttons.
//!
//! All texts are Telegram HTML; titles come from third-party metadata and
//! are always escaped.

use super::reply::Button;
use crate::media::ExtractError;
use crate::storage::StoredAudio;
use crate::utils::truncate_str;
use html_escape::encode_text;
use std::fmt::Write;

/// Callback prefix for sending a stored item back to its owner
pub const CALLBACK_DELIVER: &str = "get:";
/// Callback prefix for removing a stored item and its message
pub const CALLBACK_DISCARD: &str = "rm:";

/// Telegram allows at most 100 inline buttons per message
const MAX_PLAYLIST_BUTTONS: usize = 100;
/// Telegram rejects messages longer than this
const MAX_MESSAGE_CHARS: usize = 4096;
/// Room kept at the end of the playlist for the trailing notes
const PLAYLIST_FOOTER_RESERVE: usize = 160;
/// Title length shown in captions and button labels
const MAX_TITLE_CHARS: usize = 200;
const MAX_BUTTON_LABEL_CHARS: usize = 60;

fn title_html(title: &str) -> String {
    encode_text(&truncate_str(title, MAX_TITLE_CHARS)).into_owned()
}

/// Welcome and usage text
#[must_use]
pub fn help() -> String {
    "🎧 Send me a link to a video or track and I will archive its audio for you.\n\n\
     /playlist - list your archived audio\n\
     /delete &lt;title&gt; - remove audio by title"
        .to_string()
}

/// Reply for text that is neither a command nor a link
#[must_use]
pub fn not_a_url() -> String {
    "🔗 Send a link starting with http:// or https://, or /help for commands.".to_string()
}

/// Reply when the URL is already in the user's archive
#[must_use]
pub fn already_archived() -> String {
    "📦 This link is already in your archive. Use /playlist to get it.".to_string()
}

/// Caption of a freshly archived track
#[must_use]
pub fn archived_caption(title: &str, handle: &str) -> String {
    format!(
        "✅ Archived <b>{}</b>\nHandle: <code>{}</code>",
        title_html(title),
        encode_text(handle)
    )
}

/// Caption of a track sent back from the archive
#[must_use]
pub fn delivered_caption(title: &str) -> String {
    format!("🎵 <b>{}</b>", title_html(title))
}

/// User-facing explanation of an extraction failure.
///
/// Timeouts and oversized results get specific wording; anything else is
/// reported generically.
#[must_use]
pub fn extraction_failed(error: &ExtractError) -> String {
    match error {
        ExtractError::ExtractionTimedOut(after) => format!(
            "⏱ The download took longer than {} seconds and was stopped. Try again later.",
            after.as_secs()
        ),
        ExtractError::PayloadTooLarge { limit, .. } => format!(
            "📏 The audio is larger than {} MB and can't be archived.",
            limit / (1024 * 1024)
        ),
        _ => generic_failure(),
    }
}

/// Catch-all error reply
#[must_use]
pub fn generic_failure() -> String {
    "❌ Something went wrong. Please try again later.".to_string()
}

/// Playlist listing with one delivery button per item
#[must_use]
pub fn playlist(items: &[StoredAudio]) -> (String, Vec<Button>) {
    if items.is_empty() {
        return (
            "📭 Your archive is empty. Send me a link to get started.".to_string(),
            Vec::new(),
        );
    }

    // Counted on the HTML source, which is never shorter than what clients show
    let mut text = format!("🎶 <b>Your archive</b> ({} items)\n", items.len());
    let mut len = text.chars().count();
    let mut listed = 0;
    for (i, item) in items.iter().enumerate() {
        let line = format!("\n{}. {}", i + 1, title_html(&item.title));
        let line_len = line.chars().count();
        if len + line_len > MAX_MESSAGE_CHARS - PLAYLIST_FOOTER_RESERVE {
            break;
        }
        text.push_str(&line);
        len += line_len;
        listed += 1;
    }
    if listed < items.len() {
        let _ = write!(text, "\n…and {} more.", items.len() - listed);
    }

    let buttons: Vec<Button> = items
        .iter()
        .take(MAX_PLAYLIST_BUTTONS)
        .map(|item| {
            Button::callback(
                truncate_str(&item.title, MAX_BUTTON_LABEL_CHARS),
                format!("{CALLBACK_DELIVER}{}", item.uuid),
            )
        })
        .collect();

    if items.len() > MAX_PLAYLIST_BUTTONS {
        let _ = write!(
            text,
            "\n\nOnly the first {MAX_PLAYLIST_BUTTONS} items have buttons."
        );
    }

    (text, buttons)
}

/// Result of `/delete <title>`
#[must_use]
pub fn removed(title: &str, count: usize) -> String {
    if count == 0 {
        format!("🤷 Nothing titled <b>{}</b> in your archive.", title_html(title))
    } else {
        format!("🗑 Removed {count} × <b>{}</b>.", title_html(title))
    }
}

/// Usage hint for `/delete` without a title
#[must_use]
pub fn remove_usage() -> String {
    "Usage: /delete &lt;title&gt;".to_string()
}

/// Reply for an unknown or foreign handle
#[must_use]
pub fn handle_not_found() -> String {
    "🔍 This item is no longer in your archive.".to_string()
}

/// Button removing the stored item behind `handle`
#[must_use]
pub fn remove_button(handle: &str) -> Button {
    Button::callback("🗑 Remove", format!("{CALLBACK_DISCARD}{handle}"))
}
