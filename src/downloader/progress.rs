//! Progress state store for the in-flight acquisition
//!
//! One writer (the active pipeline) publishes partial updates; any number of
//! pollers take snapshots. Updates are merged under a lock so a poller never
//! sees half of one. The store also enforces the ordering guarantees pollers
//! rely on:
//! - phases only move forward (`error` can be entered from anywhere)
//! - percent never decreases, within a phase or across a transition
//! - `completed` pins percent to 100

use crate::downloader::strategy::PipelineMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Video,
    Audio,
    Merging,
    Completed,
    Error,
}

impl Phase {
    fn rank(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Starting => 1,
            Self::Video => 2,
            Self::Audio => 3,
            Self::Merging => 4,
            Self::Completed | Self::Error => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat record returned to pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub operation_id: Option<Uuid>,
    pub phase: Phase,
    /// Unified 0-100 across all phases
    pub percent: u8,
    pub downloaded: String,
    pub total: String,
    pub speed: String,
    pub eta: String,
    /// Human-readable status line
    pub status: String,
    pub mode: Option<PipelineMode>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            operation_id: None,
            phase: Phase::Idle,
            percent: 0,
            downloaded: String::new(),
            total: String::new(),
            speed: String::new(),
            eta: String::new(),
            status: "Ready".to_string(),
            mode: None,
            error: None,
            started_at: None,
            updated_at: None,
        }
    }
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub phase: Option<Phase>,
    pub percent: Option<u8>,
    pub downloaded: Option<String>,
    pub total: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub status: Option<String>,
    pub error: Option<String>,
}

impl ProgressUpdate {
    pub fn phase(phase: Phase) -> Self {
        Self {
            phase: Some(phase),
            ..Default::default()
        }
    }

    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent = Some(percent);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Shared, lock-guarded progress record
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    inner: Arc<RwLock<ProgressState>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new operation: `starting`, 0%, fresh operation id
    pub fn reset(&self, mode: PipelineMode) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut state = self.write();
        *state = ProgressState {
            operation_id: Some(id),
            phase: Phase::Starting,
            status: "Starting".to_string(),
            mode: Some(mode),
            started_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        id
    }

    /// Merge a partial update from the active pipeline
    pub fn publish(&self, update: ProgressUpdate) {
        let mut state = self.write();
        apply(&mut state, update);
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> ProgressState {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Terminal success
    pub fn complete(&self, status: impl Into<String>) {
        self.publish(ProgressUpdate {
            phase: Some(Phase::Completed),
            percent: Some(100),
            eta: Some(String::new()),
            status: Some(status.into()),
            ..Default::default()
        });
    }

    /// Terminal failure
    pub fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        self.publish(ProgressUpdate {
            phase: Some(Phase::Error),
            status: Some("Failed".to_string()),
            error: Some(error),
            ..Default::default()
        });
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ProgressState> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn apply(state: &mut ProgressState, update: ProgressUpdate) {
    if state.phase.is_terminal() {
        return;
    }

    if let Some(phase) = update.phase {
        if phase == Phase::Error || phase.rank() > state.phase.rank() {
            state.phase = phase;
        } else if phase.rank() < state.phase.rank() {
            // Stale update from an earlier phase
            return;
        }
    }

    if state.phase == Phase::Completed {
        state.percent = 100;
    } else if let Some(percent) = update.percent {
        state.percent = state.percent.max(percent.min(100));
    }

    if let Some(downloaded) = update.downloaded {
        state.downloaded = downloaded;
    }
    if let Some(total) = update.total {
        state.total = total;
    }
    if let Some(speed) = update.speed {
        state.speed = speed;
    }
    if let Some(eta) = update.eta {
        state.eta = eta;
    }
    if let Some(status) = update.status {
        state.status = status;
    }
    if let Some(error) = update.error {
        state.error = Some(error);
    }
    state.updated_at = Some(Utc::now());
}
