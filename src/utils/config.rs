//! Application configuration and the persisted destination folder

use crate::format::ResolverPreferences;
use crate::utils::error::{Result, StreamgrabError};
use crate::utils::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Explicit extractor binary; discovered when unset
    pub extractor_path: Option<PathBuf>,

    /// Explicit transcoder binary; discovered when unset
    pub transcoder_path: Option<PathBuf>,

    pub user_agent: String,

    pub accept_language: String,

    /// Browser to borrow cookies from during advanced URL resolution
    pub cookies_from_browser: Option<String>,

    /// Parallel fragment downloads for segmented streams
    pub concurrent_fragments: u32,

    /// Audio bitrate for MP3 extraction, in kbps
    pub audio_bitrate_kbps: u32,

    /// Number of 404 responses after which an advanced fetch is aborted
    pub segment_expiry_threshold: usize,

    /// Kill a helper process that runs longer than this (seconds)
    pub process_timeout_secs: Option<u64>,

    pub resolver: ResolverPreferences,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            extractor_path: None,
            transcoder_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            cookies_from_browser: None,
            concurrent_fragments: 10,
            audio_bitrate_kbps: 192,
            segment_expiry_threshold: 3,
            process_timeout_secs: None,
            resolver: ResolverPreferences::default(),
        }
    }
}

impl AppSettings {
    /// Load settings from the platform config directory, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&paths::settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("No settings file at {:?}, using defaults", path);
                return Self::default();
            }
        };

        match serde_json::from_str::<AppSettings>(&raw) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                warn!("Ignoring unreadable settings file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Enforce sane minimums on hand-edited values
    pub(crate) fn sanitized(mut self) -> Self {
        if self.concurrent_fragments == 0 {
            self.concurrent_fragments = 1;
        }
        if self.segment_expiry_threshold == 0 {
            self.segment_expiry_threshold = 1;
        }
        if self.audio_bitrate_kbps == 0 {
            self.audio_bitrate_kbps = 192;
        }
        self
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_secs.map(Duration::from_secs)
    }

    /// Resolve both helper binaries, preferring explicit settings
    pub fn tool_paths(&self) -> Result<ToolPaths> {
        let extractor = match &self.extractor_path {
            Some(path) => path.clone(),
            None => paths::find_tool("yt-dlp").ok_or(StreamgrabError::ToolNotFound {
                tool: "yt-dlp",
            })?,
        };
        let transcoder = match &self.transcoder_path {
            Some(path) => path.clone(),
            None => paths::find_tool("ffmpeg").ok_or(StreamgrabError::ToolNotFound {
                tool: "ffmpeg",
            })?,
        };
        Ok(ToolPaths {
            extractor,
            transcoder,
        })
    }
}

/// Locations of the external helper binaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub extractor: PathBuf,
    pub transcoder: PathBuf,
}

/// The destination folder preference.
///
/// Read once at startup from a plain-text file and rewritten on every change.
/// Pipelines call [`FolderPreference::current`] at invocation time instead of
/// caching the path.
#[derive(Debug, Clone)]
pub struct FolderPreference {
    file: PathBuf,
    current: Arc<RwLock<PathBuf>>,
}

impl FolderPreference {
    /// Load from the default preference file
    pub fn load() -> Self {
        Self::load_from(paths::folder_preference_path())
    }

    /// Load from `file`; a missing file or a path that is no longer a
    /// directory falls back to the Downloads directory.
    pub fn load_from(file: PathBuf) -> Self {
        let stored = std::fs::read_to_string(&file)
            .ok()
            .map(|raw| PathBuf::from(raw.trim()))
            .filter(|path| path.is_dir());

        let folder = match stored {
            Some(path) => path,
            None => paths::downloads_dir(),
        };
        debug!("Destination folder: {:?}", folder);

        Self {
            file,
            current: Arc::new(RwLock::new(folder)),
        }
    }

    /// The folder as of right now
    pub fn current(&self) -> PathBuf {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Change the folder and persist it
    pub fn set(&self, folder: PathBuf) -> Result<()> {
        if !folder.is_dir() {
            return Err(StreamgrabError::InvalidRequest(format!(
                "{} is not a directory",
                folder.display()
            )));
        }

        if let Some(parent) = self.file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.file, folder.to_string_lossy().as_bytes())?;

        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = folder.clone();
        info!("Destination folder changed to {:?}", folder);
        Ok(())
    }
}
