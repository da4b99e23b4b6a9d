//! Upload error types.

use std::time::Duration;

/// Errors reported by the upload orchestrator.
///
/// `ClientBusy` is returned synchronously by
/// [`request_upload`](crate::UploadOrchestrator::request_upload); the rest
/// arrive as [`Outcome::Failed`](crate::Outcome::Failed) events after the
/// orchestrator has returned to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("another upload is already in progress")]
    ClientBusy,

    #[error("server is busy with another job")]
    ServerBusy,

    #[error("status check failed: {0}")]
    ProbeFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("polling failed: {0}")]
    PollError(String),

    #[error("job did not finish within {elapsed:?}")]
    PollTimeout { elapsed: Duration },

    #[error("upload run aborted: {0}")]
    Aborted(String),
}
