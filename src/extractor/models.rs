//! Data structures for media information
//!
//! `Raw*` types mirror the extractor's JSON dump. Every field is optional
//! because sites populate wildly different subsets; the fallbacks live in
//! [`MediaInfo::from_raw`] rather than at the call sites.

use crate::extractor::catalog::FormatCatalog;
use crate::utils::units::format_clock;
use serde::{Deserialize, Serialize};

/// Title used when the probe fails or the site reports none
pub const DEFAULT_TITLE: &str = "video";

/// Metadata object as printed by `yt-dlp --dump-json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMediaInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Seconds, sometimes fractional
    pub duration: Option<f64>,
    /// Preformatted duration (`10:23`)
    pub duration_string: Option<String>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<RawThumbnail>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
    pub webpage_url: Option<String>,
    pub extractor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawThumbnail {
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// One entry of the extractor's per-stream list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub fps: Option<f64>,
    /// Total bitrate, kbps
    pub tbr: Option<f64>,
    /// Video bitrate, kbps
    pub vbr: Option<f64>,
    /// Audio bitrate, kbps
    pub abr: Option<f64>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

impl RawFormat {
    pub fn approximate_size(&self) -> Option<u64> {
        self.filesize
            .or(self.filesize_approx)
            .filter(|size| *size > 0.0)
            .map(|size| size as u64)
    }
}

/// Probe result handed to callers (e.g. for a preview card)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: Option<String>,
    pub title: String,
    pub duration_seconds: Option<u64>,
    /// `Duration: 10:23`, or `No duration` when unknown
    pub duration_label: String,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub extractor: Option<String>,
    pub catalog: FormatCatalog,
}

impl MediaInfo {
    pub fn from_raw(raw: RawMediaInfo) -> Self {
        let title = raw
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();

        let duration_seconds = raw
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as u64);

        let duration_label = match (&raw.duration_string, duration_seconds) {
            (Some(s), _) if !s.is_empty() => format!("Duration: {}", s),
            (_, Some(secs)) => format!("Duration: {}", format_clock(secs)),
            _ => "No duration".to_string(),
        };

        // The list is ordered smallest to largest, so the last one is usually the sharpest
        let thumbnail = raw
            .thumbnail
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| raw.thumbnails.iter().rev().find_map(|t| t.url.clone()));

        let catalog = FormatCatalog::from_raw(&raw.formats);

        Self {
            id: raw.id,
            title,
            duration_seconds,
            duration_label,
            uploader: raw.uploader.or(raw.channel),
            thumbnail,
            webpage_url: raw.webpage_url,
            extractor: raw.extractor,
            catalog,
        }
    }
}
