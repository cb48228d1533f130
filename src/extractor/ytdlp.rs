//! yt-dlp wrapper
//!
//! Builds the three invocation shapes (metadata probe, direct-URL resolution
//! and fetch) and runs the two read-only ones. The fetch invocation is driven
//! by the standard pipeline.

use crate::extractor::models::{MediaInfo, RawMediaInfo};
use crate::extractor::traits::MediaExtractor;
use crate::format::Container;
use crate::utils::config::AppSettings;
use crate::utils::error::{Result, StreamgrabError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, error, info, warn};

/// Invocation options shared by every extractor call
#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub user_agent: String,
    pub accept_language: String,
    pub cookies_from_browser: Option<String>,
    pub concurrent_fragments: u32,
    pub audio_bitrate_kbps: u32,
    pub timeout: Option<Duration>,
}

impl From<&AppSettings> for ExtractorOptions {
    fn from(settings: &AppSettings) -> Self {
        Self {
            user_agent: settings.user_agent.clone(),
            accept_language: settings.accept_language.clone(),
            cookies_from_browser: settings.cookies_from_browser.clone(),
            concurrent_fragments: settings.concurrent_fragments,
            audio_bitrate_kbps: settings.audio_bitrate_kbps,
            timeout: settings.process_timeout(),
        }
    }
}

/// What the fetch invocation should produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPlan {
    /// Select streams with `expression` and merge into `container`
    Streams {
        expression: String,
        container: Container,
    },
    /// Extract audio to MP3
    Audio,
}

/// yt-dlp backed extractor
#[derive(Debug, Clone)]
pub struct YtDlp {
    path: PathBuf,
    options: ExtractorOptions,
}

impl YtDlp {
    pub fn new(path: PathBuf, options: ExtractorOptions) -> Self {
        info!("Using yt-dlp at: {}", path.display());
        Self { path, options }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &ExtractorOptions {
        &self.options
    }

    /// Flags present on every invocation
    fn base_args(&self) -> Vec<String> {
        vec![
            "--no-playlist".to_string(),
            "--user-agent".to_string(),
            self.options.user_agent.clone(),
            "--add-header".to_string(),
            format!("Accept-Language:{}", self.options.accept_language),
            "--no-check-certificates".to_string(),
        ]
    }

    /// `--dump-json --skip-download` for a single item
    pub fn metadata_args(&self, url: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            ["--dump-json", "--skip-download", "--no-warnings", "--"]
                .into_iter()
                .map(String::from),
        );
        args.push(url.to_string());
        args
    }

    /// `--get-url` for `expression`, optionally with browser cookies
    pub fn resolve_args(&self, url: &str, expression: &str, with_cookies: bool) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            ["--no-warnings", "--get-url", "-f", expression]
                .into_iter()
                .map(String::from),
        );
        if with_cookies {
            if let Some(browser) = &self.options.cookies_from_browser {
                args.push("--cookies-from-browser".to_string());
                args.push(browser.clone());
            }
        }
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    /// Full fetch invocation with line-oriented progress on stdout
    pub fn fetch_args(
        &self,
        url: &str,
        folder: &Path,
        transcoder: &Path,
        plan: &FetchPlan,
    ) -> Vec<String> {
        let template = folder.join("%(title)s.%(ext)s");

        let mut args = self.base_args();
        args.extend([
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "--no-part".to_string(),
            "--hls-use-mpegts".to_string(),
            "--concurrent-fragments".to_string(),
            self.options.concurrent_fragments.to_string(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            "--ffmpeg-location".to_string(),
            transcoder.to_string_lossy().into_owned(),
        ]);

        match plan {
            FetchPlan::Streams {
                expression,
                container,
            } => {
                args.push("-f".to_string());
                args.push(expression.clone());
                args.push("--merge-output-format".to_string());
                args.push(container.extension().to_string());
            }
            FetchPlan::Audio => {
                args.extend([
                    "-f".to_string(),
                    "bestaudio/best".to_string(),
                    "--extract-audio".to_string(),
                    "--audio-format".to_string(),
                    "mp3".to_string(),
                    "--audio-quality".to_string(),
                    format!("{}K", self.options.audio_bitrate_kbps),
                ]);
            }
        }

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output> {
        debug!("Running yt-dlp {:?}", args);

        let mut cmd = AsyncCommand::new(&self.path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(0x0800_0000);

        let output = cmd.output();
        let output = match self.options.timeout {
            Some(limit) => tokio::time::timeout(limit, output).await.map_err(|_| {
                StreamgrabError::SubprocessFailure {
                    tool: "yt-dlp",
                    detail: "timed out".to_string(),
                }
            })?,
            None => output.await,
        };

        output.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StreamgrabError::ToolNotFound { tool: "yt-dlp" },
            _ => StreamgrabError::Io(e),
        })
    }

    async fn try_resolve(&self, url: &str, expression: &str, with_cookies: bool) -> Result<String> {
        let output = self
            .run(&self.resolve_args(url, expression, with_cookies))
            .await?;

        if !output.status.success() {
            return Err(StreamgrabError::ProbeFailure(failure_detail(
                output.status.code(),
                &output.stderr,
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        first_url_line(&stdout)
            .map(str::to_string)
            .ok_or_else(|| StreamgrabError::ProbeFailure("yt-dlp returned no stream URL".to_string()))
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    fn id(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str) -> Result<MediaInfo> {
        debug!("Probing media info for URL: {}", url);

        let output = self.run(&self.metadata_args(url)).await?;
        if !output.status.success() {
            let detail = failure_detail(output.status.code(), &output.stderr);
            error!("yt-dlp probe failed: {}", detail);
            return Err(StreamgrabError::ProbeFailure(detail));
        }

        parse_metadata(&String::from_utf8_lossy(&output.stdout))
    }

    async fn resolve_direct_url(&self, url: &str, expression: &str) -> Result<String> {
        let with_cookies = self.options.cookies_from_browser.is_some();

        match self.try_resolve(url, expression, with_cookies).await {
            Ok(direct) => Ok(direct),
            Err(e @ StreamgrabError::ToolNotFound { .. }) => Err(e),
            Err(e @ StreamgrabError::SubprocessFailure { .. }) => Err(e),
            Err(e) if with_cookies => {
                warn!("URL resolution failed ({}), retrying without browser cookies", e);
                self.try_resolve(url, expression, false).await
            }
            Err(e) => Err(e),
        }
    }
}

/// The first stdout line that looks like a JSON object.
///
/// yt-dlp may print log lines before the metadata, so stdout is not pure JSON.
pub fn find_metadata_line(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with('{'))
}

/// Parse probe stdout into `MediaInfo`
pub fn parse_metadata(stdout: &str) -> Result<MediaInfo> {
    let line = find_metadata_line(stdout)
        .ok_or_else(|| StreamgrabError::ProbeFailure("no metadata in yt-dlp output".to_string()))?;
    let raw: RawMediaInfo = serde_json::from_str(line)
        .map_err(|e| StreamgrabError::ProbeFailure(format!("unreadable metadata: {}", e)))?;
    Ok(MediaInfo::from_raw(raw))
}

fn first_url_line(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("http://") || line.starts_with("https://"))
}

/// `yt-dlp exited with code 1: <last stderr line>`
fn failure_detail(code: Option<i32>, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let last = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("ERROR:").trim().to_string());

    let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
    match last {
        Some(msg) => format!("yt-dlp exited with code {}: {}", code, msg),
        None => format!("yt-dlp exited with code {}", code),
    }
}
