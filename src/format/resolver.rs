//! Turns a quality selection into a yt-dlp stream-selection expression
//!
//! Every expression is a fallback chain: alternatives separated by ` / ` that
//! yt-dlp tries in order until one matches. This tolerates sites that cannot
//! report exact per-format identifiers without failing the whole request.

use crate::format::quality::{Container, QualitySelection};
use serde::{Deserialize, Serialize};

/// Codec biases for the MP4 height-ceiling chain.
///
/// These are heuristic tie-breaks; the order of the chain is fixed but the tags
/// themselves are configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverPreferences {
    /// Video codec prefix preferred for MP4 (`avc1` = H.264, plays everywhere)
    pub mp4_video_codec: String,
    /// Audio extension preferred for MP4 merges
    pub mp4_audio_ext: String,
}

impl Default for ResolverPreferences {
    fn default() -> Self {
        Self {
            mp4_video_codec: "avc1".to_string(),
            mp4_audio_ext: "m4a".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormatResolver {
    prefs: ResolverPreferences,
}

impl FormatResolver {
    pub fn new(prefs: ResolverPreferences) -> Self {
        Self { prefs }
    }

    /// Selection expression for the standard (extractor-driven) pipeline.
    ///
    /// Returns `None` for audio-only targets, which request audio extraction
    /// directly instead of a stream selection.
    pub fn selection_expression(
        &self,
        selection: &QualitySelection,
        container: Container,
    ) -> Option<String> {
        if container.is_audio_only() {
            return None;
        }

        let chain = match selection {
            QualitySelection::Best => vec!["bestvideo+bestaudio".to_string(), "best".to_string()],
            QualitySelection::ExplicitFormat { id, height } => vec![
                format!("{}+bestaudio", id),
                format!("bestvideo[height<={}]+bestaudio", height),
                format!("best[height<={}]", height),
            ],
            QualitySelection::HeightCeiling { pixels } => {
                let mut chain = Vec::with_capacity(3);
                if container == Container::Mp4 {
                    chain.push(format!(
                        "bestvideo[height<={}][vcodec^={}]+bestaudio[ext={}]",
                        pixels, self.prefs.mp4_video_codec, self.prefs.mp4_audio_ext
                    ));
                }
                chain.push(format!("bestvideo[height<={}]+bestaudio", pixels));
                chain.push(format!("best[height<={}]", pixels));
                chain
            }
            QualitySelection::RawPassthrough { expression } => return Some(expression.clone()),
        };

        Some(chain.join(" / "))
    }

    /// Selection expression for direct-URL resolution in the advanced pipeline.
    ///
    /// Streaming sites mostly publish muxed HLS variants, so the chain asks
    /// for a single combined stream under the quality ceiling.
    pub fn direct_url_expression(
        &self,
        selection: &QualitySelection,
        container: Container,
    ) -> String {
        if container.is_audio_only() {
            return "bestaudio / best".to_string();
        }

        match selection {
            QualitySelection::Best => "best".to_string(),
            QualitySelection::ExplicitFormat { id, height } => {
                format!("{} / best[height<={}] / best", id, height)
            }
            QualitySelection::HeightCeiling { pixels } => {
                format!("best[height<={}] / best", pixels)
            }
            QualitySelection::RawPassthrough { expression } => expression.clone(),
        }
    }
}
