//! Format catalog: the extractor's raw stream list, cleaned up for display
//!
//! - video: one entry per height (highest bitrate wins, ties keep the first
//!   seen), sorted by height descending
//! - audio: audio-only streams, sorted by bitrate descending, then by id
//!
//! Output does not depend on input order, except that equal-height video
//! streams with equal bitrates resolve to whichever came first.

use crate::extractor::models::RawFormat;
use crate::utils::units::format_size_label;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Video,
    Audio,
}

/// One playable stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatEntry {
    pub id: String,
    pub kind: FormatKind,
    pub ext: String,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    /// Video only
    pub height: Option<u32>,
    pub fps: Option<f64>,
    /// Approximate bitrate, kbps
    pub bitrate_kbps: Option<f64>,
    pub size_bytes: Option<u64>,
    pub label: String,
}

impl FormatEntry {
    /// Wire token selecting exactly this entry
    pub fn quality_token(&self) -> Option<String> {
        self.height.map(|h| format!("id:{}:{}", self.id, h))
    }

    fn bitrate_or_zero(&self) -> f64 {
        self.bitrate_kbps.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatCatalog {
    pub video: Vec<FormatEntry>,
    pub audio: Vec<FormatEntry>,
}

impl FormatCatalog {
    pub fn from_raw(formats: &[RawFormat]) -> Self {
        let mut video: Vec<FormatEntry> = Vec::new();
        let mut audio: Vec<FormatEntry> = Vec::new();

        for raw in formats {
            let Some(entry) = classify(raw) else {
                continue;
            };

            match entry.kind {
                FormatKind::Video => {
                    match video.iter_mut().find(|existing| existing.height == entry.height) {
                        Some(existing) => {
                            if entry.bitrate_or_zero() > existing.bitrate_or_zero() {
                                *existing = entry;
                            }
                        }
                        None => video.push(entry),
                    }
                }
                FormatKind::Audio => audio.push(entry),
            }
        }

        video.sort_by(|a, b| b.height.cmp(&a.height));
        audio.sort_by(|a, b| {
            b.bitrate_or_zero()
                .total_cmp(&a.bitrate_or_zero())
                .then_with(|| a.id.cmp(&b.id))
        });

        Self { video, audio }
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&FormatEntry> {
        self.video.iter().chain(self.audio.iter()).find(|f| f.id == id)
    }
}

fn has_codec(codec: &Option<String>) -> bool {
    codec
        .as_deref()
        .map(|c| !c.is_empty() && c != "none")
        .unwrap_or(false)
}

fn classify(raw: &RawFormat) -> Option<FormatEntry> {
    let id = raw.format_id.clone().filter(|id| !id.is_empty())?;
    let ext = raw.ext.clone().unwrap_or_else(|| "unknown".to_string());
    let height = raw.height.filter(|h| *h > 0.0).map(|h| h as u32);
    let size_bytes = raw.approximate_size();

    let has_video = has_codec(&raw.vcodec);
    let has_audio = has_codec(&raw.acodec);

    if has_video && height.is_some() {
        let bitrate_kbps = raw.tbr.or(raw.vbr).filter(|b| *b > 0.0);
        let label = video_label(height.unwrap_or_default(), raw.fps, size_bytes, bitrate_kbps);
        return Some(FormatEntry {
            id,
            kind: FormatKind::Video,
            ext,
            vcodec: raw.vcodec.clone(),
            acodec: raw.acodec.clone(),
            height,
            fps: raw.fps,
            bitrate_kbps,
            size_bytes,
            label,
        });
    }

    if has_audio && !has_video {
        let bitrate_kbps = raw.abr.or(raw.tbr).filter(|b| *b > 0.0);
        let label = audio_label(&ext, bitrate_kbps, size_bytes);
        return Some(FormatEntry {
            id,
            kind: FormatKind::Audio,
            ext,
            vcodec: None,
            acodec: raw.acodec.clone(),
            height: None,
            fps: None,
            bitrate_kbps,
            size_bytes,
            label,
        });
    }

    None
}

fn video_label(height: u32, fps: Option<f64>, size: Option<u64>, bitrate: Option<f64>) -> String {
    let mut label = format!("{}p", height);
    if let Some(fps) = fps.filter(|f| *f > 30.0) {
        label.push_str(&format!(" {}fps", fps.round() as u32));
    }
    match (size, bitrate) {
        (Some(size), _) => label.push_str(&format!(" ({})", format_size_label(size))),
        (None, Some(kbps)) => label.push_str(&format!(" ({} kbps)", kbps.round() as u64)),
        (None, None) => {}
    }
    label
}

fn audio_label(ext: &str, bitrate: Option<f64>, size: Option<u64>) -> String {
    let mut label = format!("{} audio", ext.to_uppercase());
    if let Some(kbps) = bitrate {
        label.push_str(&format!(" {}kbps", kbps.round() as u64));
    }
    if let Some(size) = size {
        label.push_str(&format!(" ({})", format_size_label(size)));
    }
    label
}
