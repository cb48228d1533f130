pub mod actor;
pub mod messages;
pub mod orchestrator;

pub use actor::BackendActor;
pub use messages::{
    BackendCommand, BackendEvent, DownloadRequest, PipelineFailure, PipelineResult,
};
pub use orchestrator::Orchestrator;
