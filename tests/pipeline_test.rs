//! End-to-end runs of the Orchestrator against shell scripts that impersonate
//! yt-dlp and ffmpeg. No network access; unix only.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use streamgrab::backend::{BackendActor, BackendCommand, BackendEvent};
use streamgrab::downloader::Phase;
use streamgrab::utils::ToolPaths;
use streamgrab::{
    AppSettings, Container, DownloadRequest, ErrorKind, FolderPreference, Orchestrator,
    PipelineMode, QualitySelection,
};
use tempfile::TempDir;

const PROBE_OK: &str = r#"echo '[generic] Extracting URL'
    echo '{"id": "abc", "title": "Clip", "duration": 10, "duration_string": "0:10", "formats": []}'
    exit 0"#;

const PROBE_FAIL: &str = r#"echo 'ERROR: Unsupported URL' >&2
    exit 1"#;

const RESOLVE_OK: &str = r#"echo 'https://cdn.example/master.m3u8'
    exit 0"#;

struct Harness {
    dir: TempDir,
    downloads: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let downloads = dir.path().join("downloads");
        std::fs::create_dir_all(&downloads).expect("downloads dir");
        Self { dir, downloads }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Fake yt-dlp: logs its arguments, then dispatches on the invocation mode
    fn extractor(&self, probe: &str, resolve: &str, fetch: &str) -> PathBuf {
        let body = format!(
            r#"#!/bin/sh
for a in "$@"; do printf '%s\n' "$a" >> '{log}'; done
echo '---' >> '{log}'
case " $* " in
  *" --dump-json "*)
    {probe}
    ;;
  *" --get-url "*)
    {resolve}
    ;;
esac
{fetch}
"#,
            log = self.path("yt-dlp.log").display(),
        );
        self.script("yt-dlp", &body)
    }

    /// Fake ffmpeg: logs its arguments, then runs `body` (`$out` is the last argument)
    fn transcoder(&self, body: &str) -> PathBuf {
        let body = format!(
            r#"#!/bin/sh
for a in "$@"; do printf '%s\n' "$a" >> '{log}'; done
out=""
for a in "$@"; do out="$a"; done
{body}
"#,
            log = self.path("ffmpeg.log").display(),
        );
        self.script("ffmpeg", &body)
    }

    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, body).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        path
    }

    fn orchestrator(&self, settings: AppSettings, extractor: PathBuf, transcoder: PathBuf) -> Orchestrator {
        let pref = self.path("save_path.txt");
        std::fs::write(&pref, self.downloads.to_string_lossy().as_bytes()).expect("pref");
        Orchestrator::with_tools(
            settings,
            ToolPaths {
                extractor,
                transcoder,
            },
            FolderPreference::load_from(pref),
        )
    }

    /// One argument list per extractor invocation
    fn extractor_calls(&self) -> Vec<Vec<String>> {
        let log = std::fs::read_to_string(self.path("yt-dlp.log")).unwrap_or_default();
        log.split("---\n")
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| chunk.lines().map(str::to_string).collect())
            .collect()
    }

    fn transcoder_log(&self) -> String {
        std::fs::read_to_string(self.path("ffmpeg.log")).unwrap_or_default()
    }
}

fn fetch_merged(folder: &Path) -> String {
    let dir = folder.display();
    format!(
        r#"echo '[download] Destination: {dir}/Clip.f137.mp4'
echo '[download]  50.0% of 10.00MiB at 1.00MiB/s ETA 00:05'
echo '[download] 100% of 10.00MiB in 00:10'
echo '[download] Destination: {dir}/Clip.f140.m4a'
echo '[download]  60.0% of 1.00MiB at 1.00MiB/s ETA 00:01'
echo '[download] 100% of 1.00MiB in 00:01'
echo '[Merger] Merging formats into "{dir}/Clip.mp4"'
printf 'data' > '{dir}/Clip.mp4'
exit 0"#
    )
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn fetch_call(calls: &[Vec<String>]) -> &Vec<String> {
    calls
        .iter()
        .find(|args| args.contains(&"--newline".to_string()))
        .expect("fetch invocation")
}

const UNUSED_TRANSCODER: &str = "exit 1";

// ============================================================
// STANDARD PIPELINE
// ============================================================

#[tokio::test]
async fn mainstream_host_runs_standard_pipeline_to_completion() {
    let h = Harness::new();
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, &fetch_merged(&h.downloads));
    let transcoder = h.transcoder(UNUSED_TRANSCODER);
    let orch = h.orchestrator(AppSettings::default(), extractor, transcoder);

    // Poll while the download runs and record every percent seen
    let poller = {
        let orch = orch.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..400 {
                let snap = orch.progress();
                seen.push(snap.percent);
                if snap.phase.is_terminal() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            seen
        })
    };

    let mut request = DownloadRequest::new("https://m.youtube.com/watch?v=abc");
    request.mode = Some(PipelineMode::Advanced);
    let result = orch.download(request).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.mode, Some(PipelineMode::Standard));
    assert_eq!(result.title.as_deref(), Some("Clip"));
    assert_eq!(result.folder, h.downloads);
    assert_eq!(result.output, Some(h.downloads.join("Clip.mp4")));

    let snap = orch.progress();
    assert_eq!(snap.phase, Phase::Completed);
    assert_eq!(snap.percent, 100);
    assert_eq!(snap.mode, Some(PipelineMode::Standard));

    let seen = poller.await.expect("poller");
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);

    let calls = h.extractor_calls();
    let fetch = fetch_call(&calls);
    assert_eq!(flag_value(fetch, "-f"), Some("bestvideo+bestaudio / best"));
    assert_eq!(flag_value(fetch, "--merge-output-format"), Some("mp4"));
    assert!(h.transcoder_log().is_empty());
}

#[tokio::test]
async fn explicit_format_token_builds_fallback_chain() {
    let h = Harness::new();
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, &fetch_merged(&h.downloads));
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(UNUSED_TRANSCODER));

    let mut request = DownloadRequest::new("https://www.youtube.com/watch?v=abc");
    request.quality = QualitySelection::decode("id:137:1080");
    let result = orch.download(request).await;
    assert!(result.success, "{:?}", result.error);

    let calls = h.extractor_calls();
    assert_eq!(
        flag_value(fetch_call(&calls), "-f"),
        Some("137+bestaudio / bestvideo[height<=1080]+bestaudio / best[height<=1080]")
    );
}

#[tokio::test]
async fn failed_probe_still_fetches_with_default_title() {
    let h = Harness::new();
    let extractor = h.extractor(PROBE_FAIL, RESOLVE_OK, &fetch_merged(&h.downloads));
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(UNUSED_TRANSCODER));

    let result = orch
        .download(DownloadRequest::new("https://vimeo.com/12345"))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.title.as_deref(), Some("video"));
    assert_eq!(h.extractor_calls().len(), 2);
    assert_eq!(orch.progress().phase, Phase::Completed);
}

#[tokio::test]
async fn audio_request_extracts_mp3() {
    let h = Harness::new();
    let dir = h.downloads.display().to_string();
    let fetch = format!(
        r#"echo '[download] Destination: {dir}/Song.webm'
echo '[download] 100% of 3.00MiB in 00:01'
echo '[ExtractAudio] Destination: {dir}/Song.mp3'
printf 'mp3' > '{dir}/Song.mp3'
exit 0"#
    );
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, &fetch);
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(UNUSED_TRANSCODER));

    let mut request = DownloadRequest::new("https://soundcloud.com/artist/song");
    request.container = Container::Mp3;
    let result = orch.download(request).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, Some(h.downloads.join("Song.mp3")));

    let calls = h.extractor_calls();
    let fetch = fetch_call(&calls);
    assert!(fetch.contains(&"--extract-audio".to_string()));
    assert_eq!(flag_value(fetch, "--audio-format"), Some("mp3"));
}

#[tokio::test]
async fn nonzero_exit_points_at_advanced_mode() {
    let h = Harness::new();
    let fetch = r#"echo 'ERROR: [generic] Unable to download webpage: HTTP Error 403' >&2
exit 1"#;
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, fetch);
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(UNUSED_TRANSCODER));

    let result = orch
        .download(DownloadRequest::new("https://videos.example.org/v/1"))
        .await;

    assert!(!result.success);
    let failure = result.error.expect("failure");
    assert_eq!(failure.kind, ErrorKind::SubprocessFailure);
    assert!(failure.message.contains("advanced mode"));

    let snap = orch.progress();
    assert_eq!(snap.phase, Phase::Error);
    assert!(snap.error.is_some());
}

#[tokio::test]
async fn unsatisfiable_expression_is_format_unavailable() {
    let h = Harness::new();
    let fetch = r#"echo 'ERROR: [youtube] abc: Requested format is not available' >&2
exit 1"#;
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, fetch);
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(UNUSED_TRANSCODER));

    let mut request = DownloadRequest::new("https://youtu.be/abc");
    request.quality = QualitySelection::decode("bestvideo[height=4320]");
    let result = orch.download(request).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::FormatUnavailable));
}

#[tokio::test]
async fn announced_output_that_never_appears_is_io_failure() {
    let h = Harness::new();
    let fetch = format!(
        r#"echo '[download] Destination: {}/Ghost.mp4'
exit 0"#,
        h.downloads.display()
    );
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, &fetch);
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(UNUSED_TRANSCODER));

    let result = orch.download(DownloadRequest::new("https://youtu.be/abc")).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::IoFailure));
}

#[tokio::test]
async fn hung_extractor_is_killed_after_timeout() {
    let h = Harness::new();
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, "exec sleep 30");
    let mut settings = AppSettings::default();
    settings.process_timeout_secs = Some(1);
    let orch = h.orchestrator(settings, extractor, h.transcoder(UNUSED_TRANSCODER));

    let started = Instant::now();
    let result = orch.download(DownloadRequest::new("https://youtu.be/abc")).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::SubprocessFailure));
    assert!(result.error.unwrap().message.contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

// ============================================================
// ADVANCED PIPELINE
// ============================================================

const TRANSCODE_OK: &str = r#"echo '  Duration: 00:00:10.00, start: 0.000000, bitrate: 800 kb/s' >&2
printf 'size=     512kB time=00:00:05.00 bitrate= 800.0kbits/s speed=2x\r' >&2
printf 'size=    1024kB time=00:00:10.00 bitrate= 800.0kbits/s speed=2x\n' >&2
printf 'data' > "$out"
exit 0"#;

#[tokio::test]
async fn streaming_host_forces_advanced_with_site_referer() {
    let h = Harness::new();
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, "exit 1");
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(TRANSCODE_OK));

    let mut request = DownloadRequest::new("https://xhamster.com/videos/some-clip-123");
    request.mode = Some(PipelineMode::Standard);
    let result = orch.download(request).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.mode, Some(PipelineMode::Advanced));
    assert_eq!(result.output, Some(h.downloads.join("Clip.mp4")));

    let log = h.transcoder_log();
    assert!(log.contains("Referer: https://xhamster.com/"));
    assert!(log.contains("https://cdn.example/master.m3u8"));
    assert!(log.contains("aac_adtstoasc"));

    let calls = h.extractor_calls();
    assert!(calls.iter().all(|args| !args.contains(&"--newline".to_string())));

    let snap = orch.progress();
    assert_eq!(snap.phase, Phase::Completed);
    assert_eq!(snap.percent, 100);
    assert_eq!(snap.mode, Some(PipelineMode::Advanced));
}

#[tokio::test]
async fn expired_segments_abort_before_natural_exit() {
    let h = Harness::new();
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, "exit 1");
    let transcoder = h.transcoder(
        r#"echo '  Duration: 00:10:00.00, start: 0.000000, bitrate: 800 kb/s' >&2
echo '[https @ 0x55d] HTTP error 404 Not Found' >&2
echo '[https @ 0x55d] HTTP error 404 Not Found' >&2
echo '[https @ 0x55d] HTTP error 404 Not Found' >&2
exec sleep 30"#,
    );
    let orch = h.orchestrator(AppSettings::default(), extractor, transcoder);

    let started = Instant::now();
    let result = orch
        .download(DownloadRequest::new("https://www.pornhub.com/view_video.php?viewkey=1"))
        .await;

    assert_eq!(result.error_kind(), Some(ErrorKind::SegmentExpired));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(orch.progress().phase, Phase::Error);
    assert!(!orch.is_busy());
}

#[tokio::test]
async fn two_not_found_lines_are_tolerated() {
    let h = Harness::new();
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, "exit 1");
    let transcoder = h.transcoder(
        r#"echo '  Duration: 00:00:10.00, start: 0.0' >&2
echo 'HTTP error 404 Not Found' >&2
echo 'HTTP error 404 Not Found' >&2
printf 'size=1024kB time=00:00:10.00 bitrate=800.0kbits/s speed=2x\n' >&2
printf 'data' > "$out"
exit 0"#,
    );
    let orch = h.orchestrator(AppSettings::default(), extractor, transcoder);

    let result = orch
        .download(DownloadRequest::new("https://xvideos.com/video123/clip"))
        .await;
    assert!(result.success, "{:?}", result.error);
}

#[tokio::test]
async fn resolution_retries_without_browser_cookies() {
    let h = Harness::new();
    let resolve = r#"case " $* " in
      *" --cookies-from-browser "*) echo 'ERROR: could not read cookies' >&2; exit 1 ;;
    esac
    echo 'https://cdn.example/master.m3u8'
    exit 0"#;
    let extractor = h.extractor(PROBE_OK, resolve, "exit 1");
    let mut settings = AppSettings::default();
    settings.cookies_from_browser = Some("chrome".to_string());
    let orch = h.orchestrator(settings, extractor, h.transcoder(TRANSCODE_OK));

    let result = orch
        .download(DownloadRequest::new("https://spankbang.com/abc/video/clip"))
        .await;
    assert!(result.success, "{:?}", result.error);

    let resolves: Vec<_> = h
        .extractor_calls()
        .into_iter()
        .filter(|args| args.contains(&"--get-url".to_string()))
        .collect();
    assert_eq!(resolves.len(), 2);
    assert!(resolves[0].contains(&"--cookies-from-browser".to_string()));
    assert!(!resolves[1].contains(&"--cookies-from-browser".to_string()));
}

#[tokio::test]
async fn unresolvable_stream_is_probe_failure() {
    let h = Harness::new();
    let extractor = h.extractor(PROBE_OK, PROBE_FAIL, "exit 1");
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(TRANSCODE_OK));

    let result = orch
        .download(DownloadRequest::new("https://eporner.com/video-x/clip"))
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::ProbeFailure));
    assert!(h.transcoder_log().is_empty());
}

#[tokio::test]
async fn hung_resolution_times_out_without_cookie_retry() {
    let h = Harness::new();
    let extractor = h.extractor(PROBE_OK, "exec sleep 30", "exit 1");
    let mut settings = AppSettings::default();
    settings.process_timeout_secs = Some(1);
    settings.cookies_from_browser = Some("chrome".to_string());
    let orch = h.orchestrator(settings, extractor, h.transcoder(TRANSCODE_OK));

    let started = Instant::now();
    let result = orch
        .download(DownloadRequest::new("https://xhamster.com/videos/x"))
        .await;

    assert_eq!(result.error_kind(), Some(ErrorKind::SubprocessFailure));
    assert!(result.error.unwrap().message.contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(10));

    let resolves = h
        .extractor_calls()
        .into_iter()
        .filter(|args| args.contains(&"--get-url".to_string()))
        .count();
    assert_eq!(resolves, 1);
    assert!(h.transcoder_log().is_empty());
}

#[tokio::test]
async fn empty_transcoder_output_is_io_failure() {
    let h = Harness::new();
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, "exit 1");
    let transcoder = h.transcoder(r#": > "$out"
exit 0"#);
    let orch = h.orchestrator(AppSettings::default(), extractor, transcoder);

    let result = orch
        .download(DownloadRequest::new("https://xnxx.com/video-1/clip"))
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::IoFailure));
}

#[tokio::test]
async fn advanced_audio_reencodes_to_mp3() {
    let h = Harness::new();
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, "exit 1");
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(TRANSCODE_OK));

    let mut request = DownloadRequest::new("https://xhamster.com/videos/clip-1");
    request.container = Container::Mp3;
    let result = orch.download(request).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, Some(h.downloads.join("Clip.mp3")));
    assert!(h.transcoder_log().contains("libmp3lame"));

    let calls = h.extractor_calls();
    let resolve = calls
        .iter()
        .find(|args| args.contains(&"--get-url".to_string()))
        .expect("resolve call");
    assert_eq!(flag_value(resolve, "-f"), Some("bestaudio / best"));
}

// ============================================================
// ORCHESTRATOR
// ============================================================

#[tokio::test]
async fn second_concurrent_request_is_rejected() {
    let h = Harness::new();
    let fetch = format!("sleep 1\n{}", fetch_merged(&h.downloads));
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, &fetch);
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(UNUSED_TRANSCODER));

    let first = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.download(DownloadRequest::new("https://youtu.be/a")).await })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while !(orch.is_busy() && orch.progress().operation_id.is_some()) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(orch.is_busy());
    let operation = orch.progress().operation_id;
    assert!(operation.is_some());

    let second = orch.download(DownloadRequest::new("https://youtu.be/b")).await;
    assert_eq!(second.error_kind(), Some(ErrorKind::Busy));
    assert_eq!(orch.progress().operation_id, operation);

    let first = first.await.expect("first download");
    assert!(first.success, "{:?}", first.error);
    assert!(!orch.is_busy());
}

#[tokio::test]
async fn folder_change_applies_to_next_download() {
    let h = Harness::new();
    let moved = h.path("moved");
    std::fs::create_dir_all(&moved).expect("moved dir");
    let extractor = h.extractor(PROBE_OK, RESOLVE_OK, &fetch_merged(&moved));
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(UNUSED_TRANSCODER));

    orch.set_folder(moved.clone()).expect("set folder");
    let result = orch.download(DownloadRequest::new("https://youtu.be/abc")).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.folder, moved);

    let calls = h.extractor_calls();
    let template = flag_value(fetch_call(&calls), "-o").expect("output template");
    assert!(template.starts_with(&*moved.to_string_lossy()));

    let stored = std::fs::read_to_string(h.path("save_path.txt")).expect("pref file");
    assert_eq!(stored.trim(), moved.to_string_lossy());
}

#[tokio::test]
async fn slow_probe_does_not_block_actor_commands() {
    let h = Harness::new();
    let moved = h.path("moved");
    std::fs::create_dir_all(&moved).expect("moved dir");
    let extractor = h.extractor("exec sleep 30", RESOLVE_OK, "exit 1");
    let orch = h.orchestrator(AppSettings::default(), extractor, h.transcoder(UNUSED_TRANSCODER));

    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::channel(8);
    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel(8);
    tokio::spawn(BackendActor::new(orch.clone(), cmd_rx, event_tx).run());

    cmd_tx
        .send(BackendCommand::ExtractInfo {
            url: "https://youtu.be/abc".to_string(),
        })
        .await
        .expect("send probe");
    cmd_tx
        .send(BackendCommand::SetFolder(moved.clone()))
        .await
        .expect("send folder");

    let event = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
        .await
        .expect("actor answered while probe is running")
        .expect("event");
    match event {
        BackendEvent::FolderChanged(Ok(folder)) => assert_eq!(folder, moved),
        other => panic!("expected FolderChanged, got {:?}", other),
    }
    assert_eq!(orch.folder(), moved);

    let _ = cmd_tx.send(BackendCommand::Shutdown).await;
}
