//! Telegram side of the archive: polling, routing and replies.

/// Bot command definitions
pub mod commands;
/// Batched update consumption loop
pub mod consumer;
/// Event routing to archive actions
pub mod listener;
/// Outbound replies
pub mod reply;
/// Telegram API calls with retry
pub mod resilient;
/// teloxide-backed transport
pub mod telegram;
/// Transport traits and errors
pub mod transport;
/// User-facing texts
pub mod views;

pub use consumer::{BatchConsumer, ConsumerError};
pub use listener::{Event, Intent, UpdateListener};
pub use reply::{Button, Reply};
pub use telegram::TelegramTransport;
pub use transport::{IncomingUpdate, ReplySink, TransportError, UpdateSource};
