//! Telegram bot that archives the audio track of media links per user.
//!
//! The pipeline is strictly sequential: [`bot::BatchConsumer`] polls
//! updates, [`bot::UpdateListener`] routes each one, [`media`] extracts audio
//! with yt-dlp and [`storage::ArchiveStore`] keeps it in SQLite.

/// Telegram polling, routing and replies
pub mod bot;
/// Configuration and settings management
pub mod config;
/// Audio extraction
pub mod media;
/// SQLite archive
pub mod storage;
/// Shared helpers
pub mod utils;
