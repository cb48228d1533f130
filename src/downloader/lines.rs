//! Classifiers for the free-form output of yt-dlp and ffmpeg
//!
//! One pure function per recognised line shape, plus `classify_*` helpers
//! that try them in order. Nothing here touches a process, so every pattern
//! is tested against captured output.

use crate::utils::units::parse_clock;
use once_cell::sync::Lazy;
use regex::Regex;

static PROGRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[download\]\s+(?P<pct>\d+(?:\.\d+)?)%\s+of\s+~?\s*(?P<total>\S+)(?:\s+in\s+\S+)?(?:\s+at\s+(?P<speed>\S+(?: B/s)?))?(?:\s+ETA\s+(?P<eta>\S+))?",
    )
    .expect("valid progress regex")
});
static DESTINATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[download\]\s+Destination:\s+(?P<path>.+)$").expect("valid regex"));
static ALREADY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[download\]\s+(?P<path>.+?) has already been downloaded").expect("valid regex")
});
static MERGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\[Merger\]\s+Merging formats into\s+"?(?P<path>[^"]+)"?$"#).expect("valid regex")
});
static EXTRACT_AUDIO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[ExtractAudio\]\s+Destination:\s+(?P<path>.+)$").expect("valid regex")
});
static INPUT_DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration:\s*(?P<clock>\d+:\d{2}:\d{2}(?:\.\d+)?)").expect("valid regex"));
static POSITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=\s*(?P<clock>\d+:\d{2}:\d{2}(?:\.\d+)?)").expect("valid regex"));
static SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"size=\s*(?P<size>\d+(?:\.\d+)?\s*[kKMG]i?B)").expect("valid regex"));
static SPEED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"speed=\s*(?P<speed>\d+(?:\.\d+)?x)").expect("valid regex"));
static NOT_FOUND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)HTTP error 404|Server returned 404|\b404 Not Found|\bnot found\b").expect("valid regex")
});

/// `[download]  42.5% of ~ 150.00MiB at  5.20MiB/s ETA 00:15`
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadLine {
    pub percent: f64,
    pub total: String,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

/// A recognised yt-dlp output line
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractorLine {
    Progress(DownloadLine),
    Destination(String),
    AlreadyDownloaded(String),
    Merging(String),
    ExtractingAudio(String),
    Error(String),
    Other,
}

pub fn parse_download_progress(line: &str) -> Option<DownloadLine> {
    let caps = PROGRESS_RE.captures(line.trim())?;
    let percent = caps.name("pct")?.as_str().parse::<f64>().ok()?;
    let known = |name: &str| {
        caps.name(name)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.starts_with("Unknown"))
    };

    Some(DownloadLine {
        percent: percent.clamp(0.0, 100.0),
        total: caps.name("total")?.as_str().to_string(),
        speed: known("speed"),
        eta: known("eta"),
    })
}

pub fn parse_destination(line: &str) -> Option<String> {
    capture_path(&DESTINATION_RE, line)
}

pub fn parse_already_downloaded(line: &str) -> Option<String> {
    capture_path(&ALREADY_RE, line)
}

pub fn parse_merge(line: &str) -> Option<String> {
    capture_path(&MERGE_RE, line)
}

pub fn parse_extract_audio(line: &str) -> Option<String> {
    capture_path(&EXTRACT_AUDIO_RE, line)
}

/// `ERROR: [site] abc: Requested format is not available`
pub fn parse_error(line: &str) -> Option<String> {
    line.trim()
        .strip_prefix("ERROR:")
        .map(|msg| msg.trim().to_string())
}

fn capture_path(re: &Regex, line: &str) -> Option<String> {
    re.captures(line.trim())
        .and_then(|caps| caps.name("path"))
        .map(|m| m.as_str().trim().to_string())
}

pub fn classify_extractor_line(line: &str) -> ExtractorLine {
    if let Some(progress) = parse_download_progress(line) {
        ExtractorLine::Progress(progress)
    } else if let Some(path) = parse_destination(line) {
        ExtractorLine::Destination(path)
    } else if let Some(path) = parse_already_downloaded(line) {
        ExtractorLine::AlreadyDownloaded(path)
    } else if let Some(path) = parse_merge(line) {
        ExtractorLine::Merging(path)
    } else if let Some(path) = parse_extract_audio(line) {
        ExtractorLine::ExtractingAudio(path)
    } else if let Some(msg) = parse_error(line) {
        ExtractorLine::Error(msg)
    } else {
        ExtractorLine::Other
    }
}

/// ffmpeg `size=   10240kB time=00:01:02.34 bitrate=... speed=1.5x` stats
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranscoderStats {
    pub position_secs: f64,
    pub size: Option<String>,
    pub speed: Option<String>,
}

/// A recognised ffmpeg output line
#[derive(Debug, Clone, PartialEq)]
pub enum TranscoderLine {
    InputDuration(f64),
    Stats(TranscoderStats),
    NotFound,
    Other,
}

/// Total input duration from `  Duration: 00:10:23.45, start: ...`
pub fn parse_input_duration(line: &str) -> Option<f64> {
    let caps = INPUT_DURATION_RE.captures(line)?;
    parse_clock(caps.name("clock")?.as_str())
}

/// Current output position from `time=00:01:02.34`
pub fn parse_position(line: &str) -> Option<f64> {
    let caps = POSITION_RE.captures(line)?;
    parse_clock(caps.name("clock")?.as_str())
}

pub fn parse_transcoder_stats(line: &str) -> Option<TranscoderStats> {
    let position_secs = parse_position(line)?;
    let size = SIZE_RE
        .captures(line)
        .and_then(|c| c.name("size"))
        .map(|m| m.as_str().replace(' ', ""));
    let speed = SPEED_RE
        .captures(line)
        .and_then(|c| c.name("speed"))
        .map(|m| m.as_str().to_string());

    Some(TranscoderStats {
        position_secs,
        size,
        speed,
    })
}

/// A failed segment request (`HTTP error 404 Not Found`, `Server returned 404`)
pub fn is_not_found(line: &str) -> bool {
    NOT_FOUND_RE.is_match(line)
}

/// Stats lines are checked first: their bitrate/size figures can contain `404`
pub fn classify_transcoder_line(line: &str) -> TranscoderLine {
    if let Some(stats) = parse_transcoder_stats(line) {
        TranscoderLine::Stats(stats)
    } else if let Some(secs) = parse_input_duration(line) {
        TranscoderLine::InputDuration(secs)
    } else if is_not_found(line) {
        TranscoderLine::NotFound
    } else {
        TranscoderLine::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // YT-DLP LINES
    // ============================================================

    #[test]
    fn test_progress_line_full() {
        let line = "[download]  42.5% of ~ 150.00MiB at  5.20MiB/s ETA 00:15";
        assert_eq!(
            parse_download_progress(line),
            Some(DownloadLine {
                percent: 42.5,
                total: "150.00MiB".to_string(),
                speed: Some("5.20MiB/s".to_string()),
                eta: Some("00:15".to_string()),
            })
        );
    }

    #[test]
    fn test_progress_line_finished() {
        let line = "[download] 100% of   10.00MiB in 00:00:03 at 2.91MiB/s";
        let parsed = parse_download_progress(line).unwrap();
        assert_eq!(parsed.percent, 100.0);
        assert_eq!(parsed.total, "10.00MiB");
        assert_eq!(parsed.speed.as_deref(), Some("2.91MiB/s"));
        assert_eq!(parsed.eta, None);
    }

    #[test]
    fn test_progress_line_unknown_speed() {
        let line = "[download]   0.0% of    3.06MiB at  Unknown B/s ETA Unknown";
        let parsed = parse_download_progress(line).unwrap();
        assert_eq!(parsed.percent, 0.0);
        assert_eq!(parsed.speed, None);
        assert_eq!(parsed.eta, None);
    }

    #[test]
    fn test_progress_line_with_fragments() {
        let line = "[download]  12.3% of ~  80.12MiB at    1.01MiB/s ETA 01:10 (frag 5/40)";
        let parsed = parse_download_progress(line).unwrap();
        assert_eq!(parsed.percent, 12.3);
        assert_eq!(parsed.eta.as_deref(), Some("01:10"));
    }

    #[test]
    fn test_destination_lines() {
        assert_eq!(
            parse_destination("[download] Destination: /tmp/My Video.f137.mp4").as_deref(),
            Some("/tmp/My Video.f137.mp4")
        );
        assert_eq!(
            parse_already_downloaded("[download] /tmp/a.mp4 has already been downloaded").as_deref(),
            Some("/tmp/a.mp4")
        );
        assert_eq!(
            parse_extract_audio("[ExtractAudio] Destination: /tmp/a.mp3").as_deref(),
            Some("/tmp/a.mp3")
        );
    }

    #[test]
    fn test_merge_line() {
        assert_eq!(
            parse_merge(r#"[Merger] Merging formats into "/tmp/My Video.mp4""#).as_deref(),
            Some("/tmp/My Video.mp4")
        );
    }

    #[test]
    fn test_error_line() {
        assert_eq!(
            parse_error("ERROR: [youtube] abc: Requested format is not available").as_deref(),
            Some("[youtube] abc: Requested format is not available")
        );
        assert_eq!(parse_error("WARNING: something"), None);
    }

    #[test]
    fn test_classify_extractor_line() {
        assert!(matches!(
            classify_extractor_line("[download]  50.0% of 10.00MiB at 1.00MiB/s ETA 00:05"),
            ExtractorLine::Progress(_)
        ));
        assert!(matches!(
            classify_extractor_line("[download] Destination: a.mp4"),
            ExtractorLine::Destination(_)
        ));
        assert_eq!(
            classify_extractor_line("[youtube] Extracting URL: https://youtu.be/x"),
            ExtractorLine::Other
        );
    }

    // ============================================================
    // FFMPEG LINES
    // ============================================================

    #[test]
    fn test_input_duration() {
        let line = "  Duration: 00:10:23.45, start: 0.000000, bitrate: 1234 kb/s";
        assert_eq!(parse_input_duration(line), Some(623.45));
        assert_eq!(parse_input_duration("  Duration: N/A, bitrate: N/A"), None);
    }

    #[test]
    fn test_stats_line() {
        let line = "frame= 1500 fps=120 q=-1.0 size=   10240kB time=00:01:02.34 bitrate=1345.6kbits/s speed=4.99x";
        let stats = parse_transcoder_stats(line).unwrap();
        assert_eq!(stats.position_secs, 62.34);
        assert_eq!(stats.size.as_deref(), Some("10240kB"));
        assert_eq!(stats.speed.as_deref(), Some("4.99x"));
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found(
            "[https @ 0x55d5] HTTP error 404 Not Found"
        ));
        assert!(is_not_found("Server returned 404"));
        assert!(is_not_found("segment-12.ts: not found"));
        assert!(!is_not_found("frame=  10 fps=0.0 q=-1.0 size=0kB time=00:00:01.00"));
        assert!(!is_not_found("bitrate=1404.5kbits/s"));
        assert!(!is_not_found("Input #0, hls, from 'https://cdn/x/404/master.m3u8':"));
        assert!(!is_not_found("Opening 'https://cdn/seg/404.ts' for reading"));
    }

    #[test]
    fn test_classify_transcoder_line() {
        assert_eq!(
            classify_transcoder_line("  Duration: 00:00:10.00, start: 0.0"),
            TranscoderLine::InputDuration(10.0)
        );
        assert!(matches!(
            classify_transcoder_line("size=  100kB time=00:00:05.00 speed=2x"),
            TranscoderLine::Stats(_)
        ));
        assert_eq!(
            classify_transcoder_line("[hls @ 0x1] HTTP error 404 Not Found"),
            TranscoderLine::NotFound
        );
        assert!(matches!(
            classify_transcoder_line("size=  512kB time=00:00:05.00 bitrate= 404.2kbits/s speed=2x"),
            TranscoderLine::Stats(_)
        ));
        assert_eq!(classify_transcoder_line("Press [q] to stop"), TranscoderLine::Other);
    }
}
