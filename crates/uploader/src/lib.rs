//! Upload orchestration for the SplatScan client.
//!
//! [`UploadOrchestrator`] runs at most one upload at a time: it checks that
//! the server is idle, streams the video, and then polls the status endpoint
//! until the training job finishes. Progress, state changes, and outcomes
//! are delivered over a channel obtained from
//! [`UploadOrchestrator::take_events`].

mod error;
mod orchestrator;
mod params;
mod target;
mod types;

pub use error::UploadError;
pub use orchestrator::UploadOrchestrator;
pub use params::{
    ITERATIONS_FIELD, KEEP_POST_FIELD, KEEP_PRE_FIELD, KEEP_TRAIN_IMAGES_FIELD, TrainingParams,
};
pub use target::{DEFAULT_TARGET, TargetError, UploadTarget, ZROK_SHARE_DOMAIN};
pub use types::{OrchestratorSettings, OrchestratorState, Outcome, RunId, UploadEvent};
