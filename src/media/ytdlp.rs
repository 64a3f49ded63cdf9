//! yt-dlp backed audio extraction.
//!
//! One extraction runs three yt-dlp invocations in order: a metadata query
//! for the title, a self-update, and the audio download itself. Only the
//! download is bounded by a deadline; a stalled fetch there would otherwise
//! block the single consumer loop forever.
//!
//! The download runs in its own process group so the deadline kill also
//! reaches the ffmpeg and fragment helpers yt-dlp starts. Every extraction
//! writes into a private scratch directory that is removed with everything
//! in it when the extraction ends.

use super::{Audio, AudioExtractor, ExtractError, ExtractStage};
use crate::config::{
    Settings, DOWNLOAD_TIMEOUT_SECS, MAX_AUDIO_SIZE, YTDLP_RETRIES, YTDLP_SOCKET_TIMEOUT_SECS,
};
use crate::utils::{sanitize_file_name, truncate_str};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Maximum characters of yt-dlp stderr kept in error messages
const MAX_STDERR_EXCERPT: usize = 500;

/// How long to wait for the stderr reader after the process exits
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Prefix of the per-extraction scratch directories inside the work dir
const SCRATCH_PREFIX: &str = "yt-dlp-";

/// Settings for [`YtDlpExtractor`].
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// yt-dlp executable
    pub binary: PathBuf,
    /// Proxy URL; `None` means direct connection
    pub proxy_url: Option<String>,
    /// Browser to read cookies from
    pub cookies_from_browser: Option<String>,
    /// Directory holding the per-extraction scratch directories
    pub work_dir: PathBuf,
    /// Deadline for the download step
    pub download_timeout: Duration,
    /// Largest accepted output file, in bytes
    pub max_size: u64,
}

impl ExtractorConfig {
    /// Build the extractor configuration from application settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            binary: settings.ytdlp_path.clone(),
            proxy_url: settings.proxy_url.clone(),
            cookies_from_browser: settings.cookies_from_browser.clone(),
            work_dir: settings.download_dir(),
            download_timeout: Duration::from_secs(DOWNLOAD_TIMEOUT_SECS),
            max_size: MAX_AUDIO_SIZE,
        }
    }
}

/// Extracts audio by running yt-dlp as a subprocess.
pub struct YtDlpExtractor {
    config: ExtractorConfig,
}

impl YtDlpExtractor {
    /// Create an extractor with the given configuration
    #[must_use]
    pub const fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Proxy and cookie flags shared by the title and download invocations.
    fn network_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(proxy) = self.config.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            args.push("--proxy".to_string());
            args.push(proxy.to_string());
        }
        if let Some(browser) = self
            .config
            .cookies_from_browser
            .as_deref()
            .filter(|b| !b.is_empty())
        {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.to_string());
        }
        args
    }

    fn scratch_dir(&self) -> Result<TempDir, ExtractError> {
        Ok(tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.config.work_dir)?)
    }

    async fn resolve_title(&self, url: &str) -> Result<String, ExtractError> {
        debug!(url = %url, "Resolving media title");

        let output = self
            .command()
            .args(["--print", "title"])
            .args(self.network_args())
            .arg(url)
            .output()
            .await
            .map_err(|source| ExtractError::Spawn {
                stage: ExtractStage::Title,
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractError::ExtractionFailed {
                stage: ExtractStage::Title,
                reason: describe_failure(output.status, &output.stderr),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let title = stdout.lines().next().unwrap_or_default().trim();
        if title.is_empty() {
            return Err(ExtractError::ExtractionFailed {
                stage: ExtractStage::Title,
                reason: "yt-dlp printed an empty title".to_string(),
            });
        }

        Ok(title.to_string())
    }

    async fn self_update(&self) -> Result<(), ExtractError> {
        debug!("Updating yt-dlp");

        let output = self
            .command()
            .arg("-U")
            .output()
            .await
            .map_err(|source| ExtractError::Spawn {
                stage: ExtractStage::Update,
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractError::ToolUpdateFailed(describe_failure(
                output.status,
                &output.stderr,
            )));
        }
        Ok(())
    }

    async fn download(&self, url: &str, output: &Path) -> Result<(), ExtractError> {
        let retries = YTDLP_RETRIES.to_string();
        let socket_timeout = YTDLP_SOCKET_TIMEOUT_SECS.to_string();

        let mut cmd = self.command();
        cmd.args(["-x", "--audio-format", "mp3"])
            .args(self.network_args())
            .arg("--no-post-overwrites")
            .args(["--retries", retries.as_str()])
            .args(["--fragment-retries", retries.as_str()])
            .args(["--socket-timeout", socket_timeout.as_str()])
            .arg("-o")
            .arg(output)
            .arg(url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        // Leader of a fresh group, so helpers can be killed together
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ExtractError::Spawn {
            stage: ExtractStage::Download,
            source,
        })?;
        // The group id outlives the leader, so capture it before wait() reaps it
        let group = child.id();

        // Drain stderr concurrently so a chatty process never blocks on a full pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let deadline = self.config.download_timeout;
        match tokio::time::timeout(deadline, child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                if let Some(task) = stderr_task {
                    task.abort();
                }
                Ok(())
            }
            Ok(Ok(status)) => {
                // The leader is already reaped; only helpers may be left
                if let Some(group) = group {
                    kill_process_group(group);
                }
                let stderr = drain_stderr(stderr_task).await;
                Err(ExtractError::ExtractionFailed {
                    stage: ExtractStage::Download,
                    reason: describe_failure(status, &stderr),
                })
            }
            Ok(Err(source)) => {
                terminate(&mut child, group).await;
                Err(ExtractError::Spawn {
                    stage: ExtractStage::Download,
                    source,
                })
            }
            Err(_) => {
                warn!(
                    url = %url,
                    timeout_secs = deadline.as_secs(),
                    "yt-dlp download exceeded deadline, killing process group"
                );
                terminate(&mut child, group).await;
                if let Some(task) = stderr_task {
                    task.abort();
                }
                Err(ExtractError::ExtractionTimedOut(deadline))
            }
        }
    }

    /// Read the output file, refusing anything above the size ceiling
    /// before it is loaded into memory.
    async fn read_bounded(&self, path: &Path) -> Result<Vec<u8>, ExtractError> {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ExtractError::ExtractionFailed {
                    stage: ExtractStage::Download,
                    reason: format!("yt-dlp produced no file at {}", path.display()),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if size > self.config.max_size {
            return Err(ExtractError::PayloadTooLarge {
                size,
                limit: self.config.max_size,
            });
        }
        if size == 0 {
            return Err(ExtractError::ExtractionFailed {
                stage: ExtractStage::Download,
                reason: "yt-dlp produced an empty file".to_string(),
            });
        }

        Ok(tokio::fs::read(path).await?)
    }
}

#[async_trait]
impl AudioExtractor for YtDlpExtractor {
    async fn extract(&self, url: &str) -> Result<Audio, ExtractError> {
        info!(url = %url, "Extracting audio");

        let title = self.resolve_title(url).await?;
        self.self_update().await?;

        // Dropping the directory removes the output and any .part/.ytdl leftovers
        let scratch = self.scratch_dir()?;
        let output = output_path(scratch.path(), &title);
        self.download(url, &output).await?;
        let data = self.read_bounded(&output).await?;

        if let Err(e) = scratch.close() {
            warn!(error = %e, "Failed to remove download scratch directory");
        }

        info!(url = %url, title = %title, bytes = data.len(), "Audio extracted");
        Ok(Audio {
            url: url.to_string(),
            title,
            data,
        })
    }
}

fn output_path(dir: &Path, title: &str) -> PathBuf {
    dir.join(format!("{}.mp3", sanitize_file_name(title)))
}

/// Kill the download and every helper in its process group, then reap the
/// direct child.
async fn terminate(child: &mut Child, group: Option<u32>) {
    if let Some(group) = group {
        kill_process_group(group);
    }

    // kill() also waits, so the child is reaped before we return
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill yt-dlp process");
    }
}

#[cfg(unix)]
fn kill_process_group(group: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(group) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        // The whole group already exited
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid, error = %e, "Failed to kill yt-dlp process group"),
    }
}

#[cfg(not(unix))]
const fn kill_process_group(_group: u32) {}

async fn drain_stderr(task: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(task) = task else {
        return Vec::new();
    };
    match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
        Ok(Ok(buf)) => buf,
        _ => Vec::new(),
    }
}

fn describe_failure(status: ExitStatus, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let excerpt = truncate_str(stderr.trim(), MAX_STDERR_EXCERPT);
    let status = status
        .code()
        .map_or_else(|| "killed by signal".to_string(), |code| format!("exit code {code}"));

    if excerpt.is_empty() {
        status
    } else {
        format!("{status}: {excerpt}")
    }
}
