//! Streamgrab - media downloader built on yt-dlp and ffmpeg
//!
//! Command-line front end: starts the backend actor, submits the request and
//! polls the progress snapshot until the download finishes.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use streamgrab::backend::{BackendActor, BackendCommand, BackendEvent};
use streamgrab::utils::paths;
use streamgrab::{
    AppSettings, Container, DownloadRequest, FolderPreference, Orchestrator, PipelineMode,
    ProgressState, QualitySelection,
};
use tokio::sync::mpsc;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "streamgrab", version, about = "Download media with yt-dlp and ffmpeg")]
struct Cli {
    /// More log output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download one URL into the destination folder
    Download {
        url: String,

        /// mp4, webm or mp3
        #[arg(long, default_value = "mp4")]
        format: Container,

        /// best, id:<format-id>:<height>, h:<height>, or a raw yt-dlp expression
        #[arg(long, default_value = "best")]
        quality: QualitySelection,

        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,

        /// Kill helper processes after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print title, duration and available formats as JSON
    Probe { url: String },
    /// Show or change the destination folder
    Folder { path: Option<PathBuf> },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Auto,
    Standard,
    Advanced,
}

impl ModeArg {
    fn preference(self) -> Option<PipelineMode> {
        match self {
            Self::Auto => None,
            Self::Standard => Some(PipelineMode::Standard),
            Self::Advanced => Some(PipelineMode::Advanced),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = match &cli.settings {
        Some(path) => AppSettings::load_from(path),
        None => AppSettings::load(),
    };
    let folder = FolderPreference::load();

    match cli.command {
        Command::Folder { path } => {
            match path {
                Some(path) => {
                    folder.set(path).context("Failed to change destination folder")?;
                    println!("Destination folder: {}", folder.current().display());
                }
                None => println!("{}", folder.current().display()),
            }
            println!("(stored in {})", paths::folder_preference_path().display());
            Ok(())
        }
        Command::Probe { url } => {
            let orchestrator = Orchestrator::new(settings, folder)?;
            let info = orchestrator.probe(&url).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Command::Download {
            url,
            format,
            quality,
            mode,
            timeout,
        } => {
            if timeout.is_some() {
                settings.process_timeout_secs = timeout;
            }
            let orchestrator = Orchestrator::new(settings, folder)?;
            let request = DownloadRequest {
                url,
                container: format,
                quality,
                mode: mode.preference(),
            };
            run_download(orchestrator, request).await
        }
    }
}

async fn run_download(orchestrator: Orchestrator, request: DownloadRequest) -> Result<()> {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = mpsc::channel(8);
    tokio::spawn(BackendActor::new(orchestrator.clone(), cmd_rx, event_tx).run());

    cmd_tx.send(BackendCommand::StartDownload(request)).await?;

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut last: Option<ProgressState> = None;

    let result = loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = orchestrator.progress();
                if last.as_ref().map_or(true, |prev| changed(prev, &snapshot)) {
                    print_snapshot(&snapshot);
                    last = Some(snapshot);
                }
            }
            event = event_rx.recv() => match event {
                Some(BackendEvent::DownloadStarted { url }) => {
                    tracing::debug!("Started {}", url);
                }
                Some(BackendEvent::DownloadFinished(result)) => break result,
                Some(_) => {}
                None => bail!("backend stopped unexpectedly"),
            }
        }
    };

    print_snapshot(&orchestrator.progress());
    let _ = cmd_tx.send(BackendCommand::Shutdown).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(failure) = result.error {
        bail!("{}: {}", failure.kind, failure.message);
    }
    Ok(())
}

fn changed(prev: &ProgressState, next: &ProgressState) -> bool {
    prev.phase != next.phase
        || prev.percent != next.percent
        || prev.status != next.status
        || prev.speed != next.speed
}

fn print_snapshot(state: &ProgressState) {
    let mut line = format!(
        "[{:>9}] {:>3}% {}",
        state.phase.as_str(),
        state.percent,
        state.status
    );
    if !state.total.is_empty() {
        line.push_str(&format!(" | {} / {}", state.downloaded, state.total));
    }
    if !state.speed.is_empty() {
        line.push_str(&format!(" | {}", state.speed));
    }
    if !state.eta.is_empty() {
        line.push_str(&format!(" | ETA {}", state.eta));
    }
    eprintln!("{}", line);
}
