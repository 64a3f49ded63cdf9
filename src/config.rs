//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the fixed limits of the archival pipeline.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    #[serde(default)]
    pub telegram_token: String,

    /// Path to the SQLite archive database
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Proxy passed to yt-dlp, direct connection when unset
    pub proxy_url: Option<String>,

    /// Browser yt-dlp reads cookies from
    #[serde(default = "default_cookies_from_browser")]
    pub cookies_from_browser: Option<String>,

    /// yt-dlp executable name or path
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: PathBuf,

    /// Directory for temporary download output
    pub work_dir: Option<PathBuf>,

    /// Long-poll timeout for `getUpdates`, in seconds
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u32,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/audio.db")
}

#[allow(clippy::unnecessary_wraps)]
fn default_cookies_from_browser() -> Option<String> {
    Some("chrome".to_string())
}

fn default_ytdlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

const fn default_poll_timeout_secs() -> u32 {
    DEFAULT_POLL_TIMEOUT_SECS
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use audio_archive_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or no bot token is configured.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg.. `APP__PROXY_URL=socks5://... ./target/app`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain UPPER_SNAKE_CASE variables, empty values treated as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Also accept the short `TOKEN` variable
        if settings.telegram_token.is_empty() {
            if let Ok(val) = std::env::var("TOKEN") {
                settings.telegram_token = val;
            }
        }
        if settings.telegram_token.is_empty() {
            return Err(ConfigError::NotFound("telegram_token".to_string()));
        }

        if settings.proxy_url.as_deref().is_some_and(str::is_empty) {
            settings.proxy_url = None;
        }

        Ok(settings)
    }

    /// Directory yt-dlp writes into, falling back to the system temp dir
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Maximum number of updates requested per `getUpdates` call
pub const BATCH_SIZE: u8 = 100;
/// Default long-poll timeout in seconds, kept below the HTTP client timeout
pub const DEFAULT_POLL_TIMEOUT_SECS: u32 = 10;

// Extraction limits
/// Wall-clock deadline for the yt-dlp download step
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 60;
/// Largest audio payload accepted into the archive (50 MiB)
pub const MAX_AUDIO_SIZE: u64 = 50 * 1024 * 1024;
/// Connection and fragment retries passed to yt-dlp
pub const YTDLP_RETRIES: u32 = 10;
/// Socket timeout passed to yt-dlp
pub const YTDLP_SOCKET_TIMEOUT_SECS: u32 = 30;

// Telegram API retry configuration
/// Maximum attempts for outbound Telegram calls
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff before the first retry
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for backoff between retries
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Single test touching the environment to avoid races between tests
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("TELEGRAM_TOKEN", "dummy_token");
        env::set_var("PROXY_URL", "socks5://127.0.0.1:1080");
        env::set_var("STORAGE_PATH", "/tmp/archive-test.db");

        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "dummy_token");
        assert_eq!(
            settings.proxy_url.as_deref(),
            Some("socks5://127.0.0.1:1080")
        );
        assert_eq!(settings.storage_path, PathBuf::from("/tmp/archive-test.db"));
        assert_eq!(settings.cookies_from_browser.as_deref(), Some("chrome"));
        assert_eq!(settings.poll_timeout_secs, DEFAULT_POLL_TIMEOUT_SECS);

        env::remove_var("TELEGRAM_TOKEN");
        env::remove_var("PROXY_URL");
        env::remove_var("STORAGE_PATH");

        // Legacy variable name
        env::set_var("TOKEN", "legacy_token");
        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "legacy_token");
        assert_eq!(settings.proxy_url, None);
        env::remove_var("TOKEN");

        assert!(Settings::new().is_err());
        Ok(())
    }

    #[test]
    fn test_download_dir_fallback() {
        let mut settings = Settings {
            telegram_token: "dummy".to_string(),
            storage_path: default_storage_path(),
            proxy_url: None,
            cookies_from_browser: None,
            ytdlp_path: default_ytdlp_path(),
            work_dir: None,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
        };
        assert_eq!(settings.download_dir(), env::temp_dir());

        settings.work_dir = Some(PathBuf::from("/var/tmp/bot"));
        assert_eq!(settings.download_dir(), PathBuf::from("/var/tmp/bot"));
    }
}
