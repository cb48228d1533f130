//! Error handling for Streamgrab

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for Streamgrab
#[derive(Debug, Error)]
pub enum StreamgrabError {
    #[error("{tool} not found. Please install {tool}")]
    ToolNotFound { tool: &'static str },

    #[error("Failed to read media info: {0}")]
    ProbeFailure(String),

    #[error("Requested format is not available: {0}")]
    FormatUnavailable(String),

    #[error(
        "Stream segments expired ({not_found} segment requests returned 404). \
         The site's stream token has run out; start the download again to get a fresh link"
    )]
    SegmentExpired { not_found: usize },

    #[error("{tool} failed: {detail}")]
    SubprocessFailure { tool: &'static str, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output file missing: {0}")]
    OutputMissing(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Another download is already in progress")]
    Busy,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl StreamgrabError {
    /// Classify this error for callers that only care about the failure category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ToolNotFound { .. } | Self::SubprocessFailure { .. } => {
                ErrorKind::SubprocessFailure
            }
            Self::ProbeFailure(_) | Self::Serialization(_) => ErrorKind::ProbeFailure,
            Self::FormatUnavailable(_) => ErrorKind::FormatUnavailable,
            Self::SegmentExpired { .. } => ErrorKind::SegmentExpired,
            Self::Io(_) | Self::OutputMissing(_) => ErrorKind::IoFailure,
            Self::Busy => ErrorKind::Busy,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

/// Failure category reported in a `PipelineResult`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProbeFailure,
    FormatUnavailable,
    SegmentExpired,
    SubprocessFailure,
    IoFailure,
    Busy,
    InvalidRequest,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProbeFailure => "probe failure",
            Self::FormatUnavailable => "format unavailable",
            Self::SegmentExpired => "segments expired",
            Self::SubprocessFailure => "subprocess failure",
            Self::IoFailure => "io failure",
            Self::Busy => "busy",
            Self::InvalidRequest => "invalid request",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, StreamgrabError>;
