//! Seams between the consumer loop and the chat platform.

use super::listener::Event;
use super::reply::Reply;
use async_trait::async_trait;
use thiserror::Error;

/// Errors talking to the chat platform.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A Telegram Bot API request failed.
    #[error("telegram {operation} request failed: {source}")]
    Request {
        /// Bot API method.
        operation: &'static str,
        /// Underlying request error.
        #[source]
        source: teloxide::RequestError,
    },
    /// An operation failed after retries or for a non-request reason.
    #[error("telegram {operation} failed: {reason}")]
    Failed {
        /// Bot API method.
        operation: &'static str,
        /// Flattened cause chain.
        reason: String,
    },
}

/// One polled update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingUpdate {
    /// Platform update id, increasing
    pub id: i32,
    /// Routable content; `None` for update kinds the bot ignores
    pub event: Option<Event>,
}

/// Source of update batches.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch up to `limit` updates with id `>= offset`, in arrival order.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll request fails.
    async fn fetch(&self, offset: i32, limit: u8) -> Result<Vec<IncomingUpdate>, TransportError>;
}

/// Destination for replies.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Deliver one reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects or never receives it.
    async fn deliver(&self, reply: Reply) -> Result<(), TransportError>;
}
