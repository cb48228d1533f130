use crate::downloader::strategy::PipelineMode;
use crate::extractor::MediaInfo;
use crate::format::{Container, QualitySelection};
use crate::utils::error::{ErrorKind, StreamgrabError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One acquisition request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub container: Container,
    /// Quality wire token (`best`, `id:<id>:<h>`, `h:<h>` or raw)
    #[serde(default)]
    pub quality: QualitySelection,
    /// Caller preference; only honoured for unclassified hosts
    #[serde(default)]
    pub mode: Option<PipelineMode>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            container: Container::default(),
            quality: QualitySelection::default(),
            mode: None,
        }
    }
}

/// Classified failure carried by a `PipelineResult`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&StreamgrabError> for PipelineFailure {
    fn from(err: &StreamgrabError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one Orchestrator invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    /// Destination folder as of this invocation
    pub folder: PathBuf,
    pub title: Option<String>,
    pub output: Option<PathBuf>,
    pub mode: Option<PipelineMode>,
    pub error: Option<PipelineFailure>,
}

impl PipelineResult {
    pub fn succeeded(
        folder: PathBuf,
        title: String,
        output: Option<PathBuf>,
        mode: PipelineMode,
    ) -> Self {
        Self {
            success: true,
            folder,
            title: Some(title),
            output,
            mode: Some(mode),
            error: None,
        }
    }

    pub fn failed(folder: PathBuf, mode: Option<PipelineMode>, err: &StreamgrabError) -> Self {
        Self {
            success: false,
            folder,
            title: None,
            output: None,
            mode,
            error: Some(PipelineFailure::from(err)),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Commands sent to the backend actor
#[derive(Debug, Clone)]
pub enum BackendCommand {
    ExtractInfo { url: String },
    StartDownload(DownloadRequest),
    SetFolder(PathBuf),
    Shutdown,
}

/// Events sent back by the backend actor
#[derive(Debug, Clone)]
pub enum BackendEvent {
    ExtractionCompleted(Result<MediaInfo, String>),
    DownloadStarted { url: String },
    DownloadFinished(PipelineResult),
    FolderChanged(Result<PathBuf, String>),
}
