//! Outbound actions produced by the listener.

/// Inline button attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Visible label
    pub label: String,
    /// Callback payload sent back when pressed
    pub data: String,
}

impl Button {
    /// Button sending `data` back as a callback query
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// A single outbound action for one chat.
///
/// Text and captions are Telegram HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Plain message, optionally with one button per row
    Text {
        /// Target chat
        chat_id: i64,
        /// Message body
        text: String,
        /// Inline buttons
        buttons: Vec<Button>,
    },
    /// Audio file with caption
    Audio {
        /// Target chat
        chat_id: i64,
        /// Track title shown by clients
        title: String,
        /// Encoded audio
        data: Vec<u8>,
        /// Caption under the file
        caption: String,
        /// Inline buttons
        buttons: Vec<Button>,
    },
    /// Delete a previously sent message
    Delete {
        /// Chat holding the message
        chat_id: i64,
        /// Message to delete
        message_id: i32,
    },
}

impl Reply {
    /// Text reply without buttons
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self::Text {
            chat_id,
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    /// Chat the reply goes to
    #[must_use]
    pub const fn chat_id(&self) -> i64 {
        match self {
            Self::Text { chat_id, .. } | Self::Audio { chat_id, .. } | Self::Delete { chat_id, .. } => {
                *chat_id
            }
        }
    }
}
