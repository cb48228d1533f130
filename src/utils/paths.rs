//! Path resolution for settings, downloads and helper binaries
//!
//! Helper binaries (yt-dlp, ffmpeg) are searched in this order:
//! 1. Next to the running executable (bundled builds ship them side by side)
//! 2. System PATH
//! 3. Common installation paths (Homebrew, pip user installs, ...)
//!
//! All returned directories are absolute; the process working directory is
//! never trusted because launchers frequently start us from `/`.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Get the configuration directory for Streamgrab, creating it if needed.
///
/// - Linux: `~/.config/streamgrab`
/// - macOS: `~/Library/Application Support/Streamgrab`
/// - Windows: `%APPDATA%\Streamgrab`
pub fn config_dir() -> PathBuf {
    let name = if cfg!(target_os = "linux") {
        "streamgrab"
    } else {
        "Streamgrab"
    };

    let dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(std::env::temp_dir)
        .join(name);

    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Failed to create config directory {:?}: {}", dir, e);
    }

    debug!("Config directory: {:?}", dir);
    dir
}

/// Path of the persisted destination-folder preference
pub fn folder_preference_path() -> PathBuf {
    config_dir().join("save_path.txt")
}

/// Path of the JSON settings file
pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Get the downloads directory, falling back to `~/Downloads` and then the temp dir.
pub fn downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| {
            warn!("Could not determine Downloads directory, using temp dir");
            std::env::temp_dir()
        })
}

/// Make a media title safe to use as a file name
pub fn sanitize_filename(name: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

    let mut sanitized: String = name
        .replace("..", "")
        .chars()
        .map(|c| {
            if invalid_chars.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    sanitized = sanitized
        .trim()
        .trim_start_matches('.')
        .trim_end_matches('.')
        .trim_end()
        .to_string();

    while sanitized.contains("__") {
        sanitized = sanitized.replace("__", "_");
    }

    // Keep well under common 255-byte file name limits once the extension is added
    if sanitized.chars().count() > 150 {
        sanitized = sanitized.chars().take(150).collect::<String>().trim_end().to_string();
    }

    if sanitized.is_empty() {
        "video".to_string()
    } else {
        sanitized
    }
}

/// Locate a helper binary by name (e.g. `yt-dlp`, `ffmpeg`)
pub fn find_tool(name: &str) -> Option<PathBuf> {
    if let Some(bundled) = find_bundled(name) {
        info!("Using bundled {}: {:?}", name, bundled);
        return Some(bundled);
    }

    if let Ok(path) = which::which(name) {
        info!("Using system {}: {:?}", name, path);
        return Some(path);
    }

    if let Some(common) = find_in_common_paths(name) {
        info!("Using {} from common path: {:?}", name, common);
        return Some(common);
    }

    warn!("{} not found anywhere", name);
    None
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

fn find_bundled(name: &str) -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;
    let file_name = executable_name(name);

    // macOS .app bundle: Contents/MacOS/streamgrab -> Contents/Resources/bin/<tool>
    if exe_dir.ends_with("MacOS") {
        let candidate = exe_dir.parent()?.join("Resources").join("bin").join(&file_name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }

    let candidate = exe_dir.join(&file_name);
    if is_executable(&candidate) {
        return Some(candidate);
    }

    None
}

fn find_in_common_paths(name: &str) -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("/opt/homebrew/bin").join(name),
        PathBuf::from("/usr/local/bin").join(name),
        PathBuf::from("/usr/bin").join(name),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local").join("bin").join(name));
    }

    candidates.into_iter().find(|path| is_executable(path))
}

/// Check if a file exists and is executable
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::metadata(path)
            .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
