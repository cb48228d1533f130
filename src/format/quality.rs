//! Quality selection and target container types
//!
//! The wire token has three structured shapes plus a verbatim escape hatch:
//!
//! | token           | selection                              |
//! |-----------------|----------------------------------------|
//! | `best`          | [`QualitySelection::Best`]             |
//! | `id:137:1080`   | [`QualitySelection::ExplicitFormat`]   |
//! | `h:720`         | [`QualitySelection::HeightCeiling`]    |
//! | anything else   | [`QualitySelection::RawPassthrough`]   |
//!
//! Decoding only produces a structured variant when encoding it gives back the
//! exact same token, so `encode(decode(t)) == t` for every string.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

pub const BEST_TOKEN: &str = "best";

/// A user's quality choice
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QualitySelection {
    /// No constraint; defer to the extractor's own ranking
    #[default]
    Best,
    /// A specific catalog entry
    ExplicitFormat { id: String, height: u32 },
    /// Fallback ceiling when no catalog is available
    HeightCeiling { pixels: u32 },
    /// Opaque selection expression, handed to the extractor unchanged
    RawPassthrough { expression: String },
}

impl QualitySelection {
    /// Decode a wire token. Never fails: unknown shapes become `RawPassthrough`.
    pub fn decode(token: &str) -> Self {
        if token == BEST_TOKEN {
            return Self::Best;
        }

        if let Some(rest) = token.strip_prefix("id:") {
            if let Some((id, height)) = rest.rsplit_once(':') {
                if !id.is_empty() {
                    if let Some(height) = canonical_height(height) {
                        return Self::ExplicitFormat {
                            id: id.to_string(),
                            height,
                        };
                    }
                }
            }
        } else if let Some(height) = token.strip_prefix("h:").and_then(canonical_height) {
            return Self::HeightCeiling { pixels: height };
        }

        Self::RawPassthrough {
            expression: token.to_string(),
        }
    }

    /// Encode back into the wire token
    pub fn encode(&self) -> String {
        match self {
            Self::Best => BEST_TOKEN.to_string(),
            Self::ExplicitFormat { id, height } => format!("id:{}:{}", id, height),
            Self::HeightCeiling { pixels } => format!("h:{}", pixels),
            Self::RawPassthrough { expression } => expression.clone(),
        }
    }

    /// Height limit implied by this selection, if any
    pub fn height_limit(&self) -> Option<u32> {
        match self {
            Self::ExplicitFormat { height, .. } => Some(*height),
            Self::HeightCeiling { pixels } => Some(*pixels),
            Self::Best | Self::RawPassthrough { .. } => None,
        }
    }
}

/// Accept only digit strings that print back identically (`720`, not `0720`)
fn canonical_height(raw: &str) -> Option<u32> {
    let value = raw.parse::<u32>().ok()?;
    (value.to_string() == raw).then_some(value)
}

impl fmt::Display for QualitySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for QualitySelection {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::decode(s))
    }
}

impl Serialize for QualitySelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for QualitySelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Ok(Self::decode(&token))
    }
}

/// Target container for the finished file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Webm,
    /// Audio-only extraction
    Mp3,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Mp3 => "mp3",
        }
    }

    pub fn is_audio_only(&self) -> bool {
        matches!(self, Self::Mp3)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "webm" => Ok(Self::Webm),
            "mp3" | "audio" => Ok(Self::Mp3),
            other => Err(format!("unsupported container: {}", other)),
        }
    }
}
