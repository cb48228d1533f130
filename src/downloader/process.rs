//! Child process with merged, line-split stdout/stderr
//!
//! yt-dlp prints progress to stdout while ffmpeg redraws its stats line on
//! stderr with bare carriage returns, so both streams are split on `\r` as
//! well as `\n` and forwarded into one channel. The consumer sees a single
//! ordered sequence of lines per process.

use crate::utils::error::{Result, StreamgrabError};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLine {
    pub stream: StreamKind,
    pub text: String,
}

/// A running helper process whose output is consumed line by line
pub struct LineProcess {
    tool: &'static str,
    child: Child,
    lines: mpsc::Receiver<ProcessLine>,
    readers: Vec<JoinHandle<()>>,
    deadline: Option<Instant>,
}

impl LineProcess {
    /// Spawn `program` with `args`; `timeout` bounds the whole run
    pub fn spawn(
        tool: &'static str,
        program: &Path,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<Self> {
        debug!("Spawning {} {:?} {:?}", tool, program, args);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        hide_console_window(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StreamgrabError::ToolNotFound { tool },
            _ => StreamgrabError::Io(e),
        })?;

        let (tx, rx) = mpsc::channel(256);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, StreamKind::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, StreamKind::Stderr, tx)));
        }

        Ok(Self {
            tool,
            child,
            lines: rx,
            readers,
            deadline: timeout.map(|t| Instant::now() + t),
        })
    }

    /// Next output line, or `None` once both streams are closed.
    ///
    /// If the deadline passes first, the process is killed and a
    /// `SubprocessFailure` is returned.
    pub async fn next_line(&mut self) -> Result<Option<ProcessLine>> {
        match self.deadline {
            None => Ok(self.lines.recv().await),
            Some(deadline) => match tokio::time::timeout_at(deadline, self.lines.recv()).await {
                Ok(line) => Ok(line),
                Err(_) => Err(self.timed_out().await),
            },
        }
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let status = match self.deadline {
            None => self.child.wait().await?,
            Some(deadline) => match tokio::time::timeout_at(deadline, self.child.wait()).await {
                Ok(status) => status?,
                Err(_) => return Err(self.timed_out().await),
            },
        };
        debug!("{} exited with {:?}", self.tool, status.code());
        Ok(status)
    }

    /// Kill the process right away and stop reading its output
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to kill {}: {}", self.tool, e);
        }
        let _ = self.child.wait().await;
        for reader in self.readers.drain(..) {
            reader.abort();
        }
        self.lines.close();
    }

    async fn timed_out(&mut self) -> StreamgrabError {
        warn!("{} exceeded its time limit, killing it", self.tool);
        self.kill().await;
        StreamgrabError::SubprocessFailure {
            tool: self.tool,
            detail: "timed out".to_string(),
        }
    }
}

impl Drop for LineProcess {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

#[cfg(windows)]
fn hide_console_window(cmd: &mut Command) {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_cmd: &mut Command) {}

async fn forward_lines<R>(stream: R, kind: StreamKind, tx: mpsc::Sender<ProcessLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let (complete, consumed) = match reader.fill_buf().await {
            Ok([]) => break,
            Ok(buf) => (split_chunk(buf, &mut pending), buf.len()),
            Err(e) => {
                debug!("Stopped reading {:?}: {}", kind, e);
                break;
            }
        };
        reader.consume(consumed);

        for text in complete {
            if tx.send(ProcessLine { stream: kind, text }).await.is_err() {
                return;
            }
        }
    }

    if !pending.is_empty() {
        let text = String::from_utf8_lossy(&pending).into_owned();
        let _ = tx.send(ProcessLine { stream: kind, text }).await;
    }
}

/// Split `chunk` on CR/LF, carrying an unterminated tail over in `pending`
fn split_chunk(chunk: &[u8], pending: &mut Vec<u8>) -> Vec<String> {
    let mut complete = Vec::new();
    for &byte in chunk {
        if byte == b'\n' || byte == b'\r' {
            if !pending.is_empty() {
                complete.push(String::from_utf8_lossy(pending).into_owned());
                pending.clear();
            }
        } else {
            pending.push(byte);
        }
    }
    complete
}
