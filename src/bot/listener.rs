//! Routes one inbound event to one archive action.
//!
//! The listener keeps no state between events. Every event causes at most
//! one extraction, one save and one reply.

use super::commands::Command;
use super::reply::Reply;
use super::views;
use crate::media::AudioExtractor;
use crate::storage::{ArchiveStore, StorageError};
use anyhow::{Context, Result};
use std::sync::Arc;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Transport-neutral inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Text message
    Message {
        /// Chat the message came from
        chat_id: i64,
        /// Message id within the chat
        message_id: i32,
        /// Sender's username, the archive key
        username: String,
        /// Message text
        text: String,
    },
    /// Inline button press
    Callback {
        /// Chat holding the pressed message
        chat_id: i64,
        /// Message carrying the button
        message_id: i32,
        /// Presser's username
        username: String,
        /// Button payload
        data: String,
    },
}

impl Event {
    /// Chat the event belongs to
    #[must_use]
    pub const fn chat_id(&self) -> i64 {
        match self {
            Self::Message { chat_id, .. } | Self::Callback { chat_id, .. } => *chat_id,
        }
    }

    /// Username the event is attributed to
    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Self::Message { username, .. } | Self::Callback { username, .. } => username,
        }
    }
}

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// `/start` or `/help`
    Help,
    /// Archive the audio behind a link
    Archive {
        /// Source URL
        url: String,
    },
    /// `/playlist`
    Playlist,
    /// `/delete <title>`
    Remove {
        /// Title to remove; may be empty
        title: String,
    },
    /// Send a stored item back
    Deliver {
        /// Retrieval handle
        handle: String,
    },
    /// Remove a stored item and the message showing it
    Discard {
        /// Retrieval handle
        handle: String,
    },
    /// Anything else
    Unknown,
}

impl Intent {
    /// Classify an event.
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        match event {
            Event::Message { text, .. } => Self::from_text(text),
            Event::Callback { data, .. } => Self::from_callback(data),
        }
    }

    fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.starts_with('/') {
            return match Command::parse(text, "") {
                Ok(Command::Start | Command::Help) => Self::Help,
                Ok(Command::Playlist) => Self::Playlist,
                Ok(Command::Delete(title)) => Self::Remove {
                    title: title.trim().to_string(),
                },
                Err(_) => Self::Unknown,
            };
        }
        if is_url(text) {
            return Self::Archive {
                url: text.to_string(),
            };
        }
        Self::Unknown
    }

    fn from_callback(data: &str) -> Self {
        if let Some(handle) = data.strip_prefix(views::CALLBACK_DELIVER) {
            return Self::Deliver {
                handle: handle.to_string(),
            };
        }
        if let Some(handle) = data.strip_prefix(views::CALLBACK_DISCARD) {
            return Self::Discard {
                handle: handle.to_string(),
            };
        }
        Self::Unknown
    }
}

fn is_url(text: &str) -> bool {
    (text.starts_with("http://") || text.starts_with("https://"))
        && !text.contains(char::is_whitespace)
}

/// Stateless router from events to replies.
pub struct UpdateListener {
    store: Arc<ArchiveStore>,
    extractor: Arc<dyn AudioExtractor>,
}

impl UpdateListener {
    /// Create a listener over the given store and extractor
    #[must_use]
    pub fn new(store: Arc<ArchiveStore>, extractor: Arc<dyn AudioExtractor>) -> Self {
        Self { store, extractor }
    }

    /// Handle one event and return the reply to send, if any.
    ///
    /// Failures never escape: they are logged with their cause chain and
    /// answered with a generic message.
    pub async fn handle(&self, event: Event) -> Option<Reply> {
        let intent = Intent::from_event(&event);
        let chat_id = event.chat_id();
        let username = event.username();

        let result = match &intent {
            Intent::Help => Ok(Some(Reply::text(chat_id, views::help()))),
            Intent::Archive { url } => self.archive(chat_id, username, url).await.map(Some),
            Intent::Playlist => self.playlist(chat_id, username).map(Some),
            Intent::Remove { title } => self.remove(chat_id, username, title).map(Some),
            Intent::Deliver { handle } => self.deliver(chat_id, username, handle).map(Some),
            Intent::Discard { handle } => {
                let Event::Callback { message_id, .. } = &event else {
                    return None;
                };
                self.discard(chat_id, *message_id, username, handle)
                    .map(Some)
            }
            Intent::Unknown => Ok(match &event {
                Event::Message { .. } => Some(Reply::text(chat_id, views::not_a_url())),
                Event::Callback { .. } => None,
            }),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    username = %username,
                    intent = ?intent,
                    error = %format!("{e:#}"),
                    "Failed to handle update"
                );
                Some(Reply::text(chat_id, views::generic_failure()))
            }
        }
    }

    async fn archive(&self, chat_id: i64, username: &str, url: &str) -> Result<Reply> {
        if self
            .store
            .exists(url, username)
            .context("failed to check archive for url")?
        {
            info!(username = %username, url = %url, "Url already archived, skipping extraction");
            return Ok(Reply::text(chat_id, views::already_archived()));
        }

        let audio = match self.extractor.extract(url).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(username = %username, url = %url, error = %e, "Audio extraction failed");
                return Ok(Reply::text(chat_id, views::extraction_failed(&e)));
            }
        };

        let handle = Uuid::new_v4().to_string();
        self.store
            .save(&audio, username, &handle)
            .context("failed to save extracted audio")?;

        info!(username = %username, title = %audio.title, handle = %handle, "Audio archived");
        Ok(Reply::Audio {
            chat_id,
            caption: views::archived_caption(&audio.title, &handle),
            buttons: vec![views::remove_button(&handle)],
            title: audio.title,
            data: audio.data,
        })
    }

    fn playlist(&self, chat_id: i64, username: &str) -> Result<Reply> {
        let items = self
            .store
            .playlist(username)
            .context("failed to load playlist")?;
        let (text, buttons) = views::playlist(&items);
        Ok(Reply::Text {
            chat_id,
            text,
            buttons,
        })
    }

    fn remove(&self, chat_id: i64, username: &str, title: &str) -> Result<Reply> {
        if title.is_empty() {
            return Ok(Reply::text(chat_id, views::remove_usage()));
        }
        let removed = self
            .store
            .remove(title, username)
            .context("failed to remove audio by title")?;
        Ok(Reply::text(chat_id, views::removed(title, removed)))
    }

    fn deliver(&self, chat_id: i64, username: &str, handle: &str) -> Result<Reply> {
        if !self.owns(username, handle)? {
            return Ok(Reply::text(chat_id, views::handle_not_found()));
        }

        let audio = match self.store.audio_by_handle(handle) {
            Ok(audio) => audio,
            Err(StorageError::NotFound { .. }) => {
                return Ok(Reply::text(chat_id, views::handle_not_found()))
            }
            Err(e) => return Err(e).context("failed to fetch audio by handle"),
        };

        Ok(Reply::Audio {
            chat_id,
            caption: views::delivered_caption(&audio.title),
            buttons: vec![views::remove_button(&audio.uuid)],
            title: audio.title,
            data: audio.data,
        })
    }

    fn discard(&self, chat_id: i64, message_id: i32, username: &str, handle: &str) -> Result<Reply> {
        let (title, owner) = match self.store.lookup_by_handle(handle) {
            Ok(found) => found,
            Err(StorageError::NotFound { .. }) => {
                return Ok(Reply::text(chat_id, views::handle_not_found()))
            }
            Err(e) => return Err(e).context("failed to resolve handle"),
        };
        if owner != username {
            return Ok(Reply::text(chat_id, views::handle_not_found()));
        }

        // Title match, so duplicates of the same title go too
        let removed = self
            .store
            .remove(&title, &owner)
            .context("failed to remove audio by handle")?;
        info!(username = %username, title = %title, removed, "Discarded audio");

        Ok(Reply::Delete {
            chat_id,
            message_id,
        })
    }

    fn owns(&self, username: &str, handle: &str) -> Result<bool> {
        match self.store.lookup_by_handle(handle) {
            Ok((_, owner)) => Ok(owner == username),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e).context("failed to resolve handle"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> Event {
        Event::Message {
            chat_id: 1,
            message_id: 10,
            username: "alice".to_string(),
            text: text.to_string(),
        }
    }

    fn callback(data: &str) -> Event {
        Event::Callback {
            chat_id: 1,
            message_id: 10,
            username: "alice".to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_intent_from_text() {
        assert_eq!(
            Intent::from_event(&message(" https://example.com/v1 ")),
            Intent::Archive {
                url: "https://example.com/v1".to_string()
            }
        );
        assert_eq!(Intent::from_event(&message("/start")), Intent::Help);
        assert_eq!(Intent::from_event(&message("/playlist")), Intent::Playlist);
        assert_eq!(
            Intent::from_event(&message("/delete My Title")),
            Intent::Remove {
                title: "My Title".to_string()
            }
        );
        assert_eq!(Intent::from_event(&message("/unknown")), Intent::Unknown);
        assert_eq!(Intent::from_event(&message("hello")), Intent::Unknown);
        assert_eq!(
            Intent::from_event(&message("https://a.com and more")),
            Intent::Unknown
        );
        assert_eq!(Intent::from_event(&message("ftp://a.com")), Intent::Unknown);
    }

    #[test]
    fn test_intent_from_callback() {
        assert_eq!(
            Intent::from_event(&callback("get:abc")),
            Intent::Deliver {
                handle: "abc".to_string()
            }
        );
        assert_eq!(
            Intent::from_event(&callback("rm:abc")),
            Intent::Discard {
                handle: "abc".to_string()
            }
        );
        assert_eq!(Intent::from_event(&callback("other")), Intent::Unknown);
    }
}
