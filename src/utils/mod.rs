//! Utility modules for error handling, configuration and paths

pub mod config;
pub mod error;
pub mod paths;
pub mod units;

// Re-export for convenience
pub use config::{AppSettings, FolderPreference, ToolPaths};
pub use error::{ErrorKind, StreamgrabError};
pub use paths::{downloads_dir, find_tool, sanitize_filename};
