//! Audio acquisition.
//!
//! Turns a source URL into a titled audio payload. The production
//! implementation shells out to yt-dlp, see [`ytdlp::YtDlpExtractor`].

pub mod ytdlp;

pub use ytdlp::{ExtractorConfig, YtDlpExtractor};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Extracted audio track, held in memory between extraction and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audio {
    /// Source locator the audio was extracted from
    pub url: String,
    /// Title reported by the source
    pub title: String,
    /// Encoded audio bytes
    pub data: Vec<u8>,
}

/// Step of the extraction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStage {
    /// Metadata query for the title
    Title,
    /// `yt-dlp -U`
    Update,
    /// Audio download to the work directory
    Download,
}

impl fmt::Display for ExtractStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title => f.write_str("title"),
            Self::Update => f.write_str("update"),
            Self::Download => f.write_str("download"),
        }
    }
}

/// Errors produced while extracting audio.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// yt-dlp exited unsuccessfully or produced unusable output.
    #[error("yt-dlp {stage} stage failed: {reason}")]
    ExtractionFailed {
        /// Step that failed.
        stage: ExtractStage,
        /// Exit status with a stderr excerpt.
        reason: String,
    },
    /// yt-dlp could not be started or waited on.
    #[error("failed to run yt-dlp {stage} stage: {source}")]
    Spawn {
        /// Step that failed.
        stage: ExtractStage,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// `yt-dlp -U` failed; downloads are refused with a stale tool.
    #[error("yt-dlp self-update failed: {0}")]
    ToolUpdateFailed(String),
    /// The download did not finish before the deadline and was killed.
    #[error("yt-dlp download timed out after {}s", .0.as_secs())]
    ExtractionTimedOut(Duration),
    /// The downloaded file exceeds the size ceiling.
    #[error("downloaded audio is {size} bytes, limit is {limit} bytes")]
    PayloadTooLarge {
        /// Size of the downloaded file.
        size: u64,
        /// Configured ceiling.
        limit: u64,
    },
    /// The scratch directory or the downloaded file could not be used.
    #[error("failed to access download output: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of audio payloads for a URL.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Extract the audio track behind `url`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractError`] describing which step failed.
    async fn extract(&self, url: &str) -> Result<Audio, ExtractError>;
}
