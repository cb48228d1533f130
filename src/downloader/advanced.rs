//! Advanced pipeline for token-protected streaming sites
//!
//! yt-dlp only resolves the direct stream URL. ffmpeg fetches it with
//! site-specific headers and remuxes into the target container. Expired
//! segment tokens show up as repeated 404s; once the threshold is reached the
//! transcoder is killed instead of waiting for it to give up.

use crate::downloader::lines::{classify_transcoder_line, TranscoderLine, TranscoderStats};
use crate::downloader::process::LineProcess;
use crate::downloader::progress::{Phase, ProgressStore, ProgressUpdate};
use crate::downloader::strategy::{host_matches, host_of};
use crate::extractor::traits::MediaExtractor;
use crate::format::Container;
use crate::utils::config::AppSettings;
use crate::utils::error::{Result, StreamgrabError};
use crate::utils::paths::sanitize_filename;
use crate::utils::units::format_clock;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Referer sent to each known streaming host
const REFERERS: &[(&str, &str)] = &[
    ("xhamster.com", "https://xhamster.com/"),
    ("xhamster.desi", "https://xhamster.desi/"),
    ("pornhub.com", "https://www.pornhub.com/"),
    ("xvideos.com", "https://www.xvideos.com/"),
    ("xnxx.com", "https://www.xnxx.com/"),
    ("spankbang.com", "https://spankbang.com/"),
    ("eporner.com", "https://www.eporner.com/"),
];

/// Transcoder invocation settings
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    pub user_agent: String,
    pub accept_language: String,
    pub audio_bitrate_kbps: u32,
    /// 404 lines tolerated before the run is declared expired
    pub expiry_threshold: usize,
    pub timeout: Option<Duration>,
}

impl From<&AppSettings> for TranscodeOptions {
    fn from(settings: &AppSettings) -> Self {
        Self {
            user_agent: settings.user_agent.clone(),
            accept_language: settings.accept_language.clone(),
            audio_bitrate_kbps: settings.audio_bitrate_kbps,
            expiry_threshold: settings.segment_expiry_threshold,
            timeout: settings.process_timeout(),
        }
    }
}

/// Referer for the page URL's host, if it is a known streaming site
pub fn referer_for(page_url: &str) -> Option<&'static str> {
    let host = host_of(page_url)?;
    REFERERS
        .iter()
        .find(|(domain, _)| host_matches(&host, domain))
        .map(|(_, referer)| *referer)
}

/// CRLF-terminated header block for ffmpeg's `-headers`
pub fn header_block(page_url: &str, options: &TranscodeOptions) -> String {
    match referer_for(page_url) {
        Some(referer) => format!(
            "User-Agent: {}\r\nReferer: {}\r\n",
            options.user_agent, referer
        ),
        None => format!(
            "User-Agent: {}\r\nAccept-Language: {}\r\n",
            options.user_agent, options.accept_language
        ),
    }
}

/// Full ffmpeg argument list for one fetch
pub fn transcoder_args(
    page_url: &str,
    direct_url: &str,
    output: &Path,
    container: Container,
    options: &TranscodeOptions,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-nostdin",
        "-y",
        "-user_agent",
        options.user_agent.as_str(),
        "-headers",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    args.push(header_block(page_url, options));
    args.extend(
        [
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
            "5",
            "-i",
            direct_url,
        ]
        .into_iter()
        .map(String::from),
    );

    match container {
        Container::Mp3 => {
            args.extend(["-vn", "-c:a", "libmp3lame", "-b:a"].into_iter().map(String::from));
            args.push(format!("{}k", options.audio_bitrate_kbps));
        }
        Container::Mp4 => {
            args.extend(["-c", "copy", "-bsf:a", "aac_adtstoasc"].into_iter().map(String::from));
        }
        Container::Webm => {
            args.extend(["-c", "copy"].into_iter().map(String::from));
        }
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

/// Everything one advanced run needs to know about the request
#[derive(Debug, Clone)]
pub struct AdvancedJob<'a> {
    pub url: &'a str,
    pub folder: &'a Path,
    pub title: &'a str,
    pub container: Container,
    /// Stream-selection expression for URL resolution
    pub expression: String,
}

impl AdvancedJob<'_> {
    pub fn output_path(&self) -> PathBuf {
        self.folder.join(format!(
            "{}.{}",
            sanitize_filename(self.title),
            self.container.extension()
        ))
    }
}

pub struct AdvancedPipeline<'a> {
    extractor: &'a dyn MediaExtractor,
    transcoder: &'a Path,
    store: &'a ProgressStore,
    options: TranscodeOptions,
}

impl<'a> AdvancedPipeline<'a> {
    pub fn new(
        extractor: &'a dyn MediaExtractor,
        transcoder: &'a Path,
        store: &'a ProgressStore,
        options: TranscodeOptions,
    ) -> Self {
        Self {
            extractor,
            transcoder,
            store,
            options,
        }
    }

    pub async fn run(&self, job: &AdvancedJob<'_>) -> Result<PathBuf> {
        info!("Advanced pipeline: {}", job.url);

        self.store.publish(
            ProgressUpdate::phase(Phase::Starting).with_status("Resolving stream URL"),
        );
        let direct_url = self
            .extractor
            .resolve_direct_url(job.url, &job.expression)
            .await?;
        debug!("Resolved direct URL via {}", self.extractor.id());

        let output = job.output_path();
        let args = transcoder_args(job.url, &direct_url, &output, job.container, &self.options);

        self.store.publish(
            ProgressUpdate::phase(Phase::Video)
                .with_percent(0)
                .with_status("Downloading stream"),
        );

        let mut process =
            LineProcess::spawn("ffmpeg", self.transcoder, &args, self.options.timeout)?;
        let mut tracker = TranscodeTracker::new(self.options.expiry_threshold);

        while let Some(line) = process.next_line().await? {
            match tracker.observe(&line.text) {
                Observation::Update(update) => self.store.publish(update),
                Observation::Expired => {
                    warn!(
                        "{} segment requests failed, aborting ffmpeg",
                        tracker.not_found()
                    );
                    process.kill().await;
                    return Err(StreamgrabError::SegmentExpired {
                        not_found: tracker.not_found(),
                    });
                }
                Observation::Nothing => {}
            }
        }

        let status = process.wait().await?;
        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(StreamgrabError::SubprocessFailure {
                tool: "ffmpeg",
                detail: format!(
                    "exited with code {}: {}. Try standard mode for this site",
                    code,
                    tracker.last_line().unwrap_or("no output")
                ),
            });
        }

        let size = tokio::fs::metadata(&output).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(StreamgrabError::OutputMissing(output.display().to_string()));
        }

        info!("Advanced pipeline finished: {:?} ({} bytes)", output, size);
        self.store.complete("Download complete");
        Ok(output)
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum Observation {
    Update(ProgressUpdate),
    Expired,
    Nothing,
}

/// Pure state over ffmpeg output lines
#[derive(Debug)]
pub(crate) struct TranscodeTracker {
    threshold: usize,
    total_secs: Option<f64>,
    not_found: usize,
    last_line: Option<String>,
}

impl TranscodeTracker {
    pub(crate) fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            total_secs: None,
            not_found: 0,
            last_line: None,
        }
    }

    pub(crate) fn not_found(&self) -> usize {
        self.not_found
    }

    pub(crate) fn last_line(&self) -> Option<&str> {
        self.last_line.as_deref()
    }

    pub(crate) fn observe(&mut self, line: &str) -> Observation {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            self.last_line = Some(trimmed.to_string());
        }

        match classify_transcoder_line(line) {
            TranscoderLine::InputDuration(secs) => {
                // First Duration line is the input; later ones describe outputs
                if self.total_secs.is_none() && secs > 0.0 {
                    self.total_secs = Some(secs);
                }
                Observation::Nothing
            }
            TranscoderLine::Stats(stats) => Observation::Update(self.stats_update(stats)),
            TranscoderLine::NotFound => {
                self.not_found += 1;
                debug!("Segment not found ({}/{})", self.not_found, self.threshold);
                if self.not_found >= self.threshold {
                    Observation::Expired
                } else {
                    Observation::Nothing
                }
            }
            TranscoderLine::Other => Observation::Nothing,
        }
    }

    fn stats_update(&self, stats: TranscoderStats) -> ProgressUpdate {
        let percent = self.total_secs.map(|total| {
            (stats.position_secs / total * 100.0).clamp(0.0, 100.0).floor() as u8
        });
        let eta = self
            .total_secs
            .zip(stats.speed.as_deref().and_then(speed_factor))
            .map(|(total, factor)| {
                let remaining = (total - stats.position_secs).max(0.0) / factor;
                format_clock(remaining.round() as u64)
            });

        // No total size is known up front, so `total` stays unset
        ProgressUpdate {
            phase: Some(Phase::Video),
            percent,
            downloaded: stats.size,
            speed: stats.speed,
            eta,
            ..Default::default()
        }
    }
}

/// `2.5x` -> 2.5; zero or unparsable factors give no estimate
fn speed_factor(speed: &str) -> Option<f64> {
    speed
        .trim()
        .trim_end_matches('x')
        .parse::<f64>()
        .ok()
        .filter(|f| *f > 0.0)
}
