//! Acquisition pipelines and the pieces they share

pub mod advanced;
pub mod lines;
pub mod process;
pub mod progress;
pub mod standard;
pub mod strategy;

pub use advanced::{AdvancedJob, AdvancedPipeline, TranscodeOptions};
pub use progress::{Phase, ProgressState, ProgressStore, ProgressUpdate};
pub use standard::{unified_percent, StandardPipeline};
pub use strategy::{HostClass, MediaTarget, PipelineMode};
