//! Streaming multipart video upload with byte-level progress.
//!
//! The [`TransferClient`] trait is the seam the orchestrator depends on;
//! [`HttpTransferClient`] is the reqwest implementation that streams the
//! file in fixed-size chunks instead of buffering it.

mod client;
mod progress;
mod types;

pub use client::{HttpTransferClient, TransferClient, TransferFuture};
pub use progress::{ProgressCallback, ProgressReporter, percent_of};
pub use types::{
    DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, TransferResponse, TransferSettings,
    UploadJob, VIDEO_CONTENT_TYPE, VIDEO_FIELD,
};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid file: {0}")]
    InvalidFile(String),
}
