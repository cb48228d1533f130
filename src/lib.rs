//! Streamgrab library
//!
//! Media acquisition on top of yt-dlp and ffmpeg: host classification,
//! format catalogs and quality resolution, two fetch pipelines and a
//! pollable progress store.

pub mod backend;
pub mod downloader;
pub mod extractor;
pub mod format;
pub mod utils;

// Re-export main types for easier use
pub use backend::{DownloadRequest, Orchestrator, PipelineResult};
pub use downloader::{Phase, PipelineMode, ProgressState};
pub use extractor::{MediaExtractor, MediaInfo, YtDlp};
pub use format::{Container, QualitySelection};
pub use utils::{AppSettings, ErrorKind, FolderPreference, StreamgrabError};
