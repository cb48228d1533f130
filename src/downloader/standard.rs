//! Standard pipeline: yt-dlp fetches and merges on its own
//!
//! Phases: `starting -> video -> audio? -> merging? -> completed | error`.
//! `audio` is entered on a second distinct destination line, `merging` when
//! a merge or audio conversion is announced.

use crate::downloader::lines::{classify_extractor_line, DownloadLine, ExtractorLine};
use crate::downloader::process::LineProcess;
use crate::downloader::progress::{Phase, ProgressStore, ProgressUpdate};
use crate::extractor::ytdlp::{FetchPlan, YtDlp};
use crate::utils::error::{Result, StreamgrabError};
use crate::utils::units::{format_size, parse_size};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Unified percent while merging
pub const MERGING_PERCENT: u8 = 93;

const FORMAT_UNAVAILABLE_MARKER: &str = "Requested format is not available";

/// Map a raw per-phase percent onto the single 0-100 bar.
///
/// `video` covers 0-75, `audio` 75-92, `merging` sits at 93. Other phases
/// carry no download percent.
pub fn unified_percent(phase: Phase, raw: f64) -> Option<u8> {
    let raw = if raw.is_finite() { raw.clamp(0.0, 100.0) } else { 0.0 };
    let unified = match phase {
        Phase::Video => (raw * 0.75).floor(),
        Phase::Audio => (75.0 + raw * 17.0 / 100.0).floor(),
        Phase::Merging => f64::from(MERGING_PERCENT),
        Phase::Completed => 100.0,
        _ => return None,
    };
    Some(unified as u8)
}

/// Runs one extractor fetch and mirrors its output into the progress store
pub struct StandardPipeline<'a> {
    extractor: &'a YtDlp,
    transcoder: &'a Path,
    store: &'a ProgressStore,
}

impl<'a> StandardPipeline<'a> {
    pub fn new(extractor: &'a YtDlp, transcoder: &'a Path, store: &'a ProgressStore) -> Self {
        Self {
            extractor,
            transcoder,
            store,
        }
    }

    /// Fetch `url` into `folder`, returning the final file when yt-dlp named it
    pub async fn run(&self, url: &str, folder: &Path, plan: &FetchPlan) -> Result<Option<PathBuf>> {
        info!("Standard pipeline: {}", url);

        let args = self.extractor.fetch_args(url, folder, self.transcoder, plan);
        let mut process = LineProcess::spawn(
            "yt-dlp",
            self.extractor.path(),
            &args,
            self.extractor.options().timeout,
        )?;

        let mut tracker = StandardTracker::new(folder);
        while let Some(line) = process.next_line().await? {
            if let Some(update) = tracker.observe(&line.text) {
                self.store.publish(update);
            }
        }

        let status = process.wait().await?;
        if !status.success() {
            let err = tracker.failure(status.code());
            warn!("yt-dlp fetch failed: {}", err);
            return Err(err);
        }

        let output = tracker.output();
        if let Some(path) = &output {
            if !path.exists() {
                return Err(StreamgrabError::OutputMissing(path.display().to_string()));
            }
        }

        info!("Standard pipeline finished: {:?}", output);
        self.store.complete("Download complete");
        Ok(output)
    }
}

/// Pure state machine over yt-dlp output lines
#[derive(Debug)]
pub(crate) struct StandardTracker {
    folder: PathBuf,
    phase: Phase,
    destinations: Vec<String>,
    output: Option<PathBuf>,
    last_error: Option<String>,
    format_unavailable: bool,
}

impl StandardTracker {
    pub(crate) fn new(folder: &Path) -> Self {
        Self {
            folder: folder.to_path_buf(),
            phase: Phase::Starting,
            destinations: Vec::new(),
            output: None,
            last_error: None,
            format_unavailable: false,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    /// Final file as announced by yt-dlp, resolved against the destination folder
    pub(crate) fn output(&self) -> Option<PathBuf> {
        self.output.as_ref().map(|p| self.folder.join(p))
    }

    pub(crate) fn observe(&mut self, line: &str) -> Option<ProgressUpdate> {
        match classify_extractor_line(line) {
            ExtractorLine::Progress(progress) => self.on_progress(progress),
            ExtractorLine::Destination(path) => self.on_destination(path),
            ExtractorLine::AlreadyDownloaded(path) => {
                self.output = Some(PathBuf::from(path));
                self.enter(Phase::Video);
                Some(ProgressUpdate::phase(self.phase).with_status("Already downloaded"))
            }
            ExtractorLine::Merging(path) => {
                self.output = Some(PathBuf::from(path));
                self.enter(Phase::Merging);
                Some(
                    ProgressUpdate::phase(Phase::Merging)
                        .with_percent(MERGING_PERCENT)
                        .with_status("Merging video and audio"),
                )
            }
            ExtractorLine::ExtractingAudio(path) => {
                self.output = Some(PathBuf::from(path));
                self.enter(Phase::Merging);
                Some(
                    ProgressUpdate::phase(Phase::Merging)
                        .with_percent(MERGING_PERCENT)
                        .with_status("Converting audio"),
                )
            }
            ExtractorLine::Error(message) => {
                warn!("yt-dlp: {}", message);
                if message.contains(FORMAT_UNAVAILABLE_MARKER) {
                    self.format_unavailable = true;
                }
                self.last_error = Some(message);
                None
            }
            ExtractorLine::Other => None,
        }
    }

    fn enter(&mut self, phase: Phase) {
        if phase != self.phase {
            debug!("Standard pipeline phase: {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn on_destination(&mut self, path: String) -> Option<ProgressUpdate> {
        if self.destinations.contains(&path) {
            return None;
        }
        self.destinations.push(path.clone());
        self.output = Some(PathBuf::from(path));

        let (phase, status) = match self.destinations.len() {
            1 => (Phase::Video, "Downloading video"),
            _ => (Phase::Audio, "Downloading audio"),
        };
        self.enter(phase);
        Some(ProgressUpdate::phase(phase).with_status(status))
    }

    fn on_progress(&mut self, progress: DownloadLine) -> Option<ProgressUpdate> {
        if self.phase == Phase::Starting {
            self.enter(Phase::Video);
        }
        let percent = match self.phase {
            Phase::Video | Phase::Audio => unified_percent(self.phase, progress.percent)?,
            _ => return None,
        };

        let downloaded = parse_size(&progress.total)
            .map(|total| format_size((total as f64 * progress.percent / 100.0) as u64));
        let status = if self.phase == Phase::Audio {
            "Downloading audio"
        } else {
            "Downloading video"
        };

        Some(ProgressUpdate {
            phase: Some(self.phase),
            percent: Some(percent),
            downloaded,
            total: Some(progress.total.trim_start_matches('~').to_string()),
            speed: Some(progress.speed.unwrap_or_default()),
            eta: Some(progress.eta.unwrap_or_default()),
            status: Some(status.to_string()),
            error: None,
        })
    }

    /// Error for a non-zero exit
    pub(crate) fn failure(&self, code: Option<i32>) -> StreamgrabError {
        let last = self
            .last_error
            .clone()
            .unwrap_or_else(|| "no error message".to_string());

        if self.format_unavailable {
            return StreamgrabError::FormatUnavailable(last);
        }

        let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        StreamgrabError::SubprocessFailure {
            tool: "yt-dlp",
            detail: format!(
                "exited with code {}: {}. This site may need advanced mode",
                code, last
            ),
        }
    }
}
