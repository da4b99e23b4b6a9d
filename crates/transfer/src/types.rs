use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::TransferError;

/// Multipart field name of the video part.
pub const VIDEO_FIELD: &str = "video";

/// Content type declared for the video part.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Default read size per chunk: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Smallest accepted chunk size: 8 KiB.
pub const MIN_CHUNK_SIZE: usize = 8 * 1024;

/// Largest accepted chunk size: 1 MiB.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// One attempt to transfer a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    path: PathBuf,
    file_name: String,
    content_length: u64,
    params: BTreeMap<String, String>,
}

impl UploadJob {
    /// Builds a job from a file on disk, reading its length and base name.
    pub async fn from_path(
        path: impl Into<PathBuf>,
        params: BTreeMap<String, String>,
    ) -> Result<Self, TransferError> {
        let path = path.into();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(TransferError::InvalidFile(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let file_name = base_name(&path)?;
        Ok(Self {
            path,
            file_name,
            content_length: meta.len(),
            params,
        })
    }

    /// Path of the source file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name sent in the multipart `filename` attribute.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Length of the file when the job was created.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Extra form fields, one text part each.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

fn base_name(path: &Path) -> Result<String, TransferError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            TransferError::InvalidFile(format!("{} has no usable file name", path.display()))
        })
}

/// HTTP status and body returned by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResponse {
    pub status: u16,
    pub body: String,
}

impl TransferResponse {
    /// The server accepted the video and started a job.
    pub fn is_accepted(&self) -> bool {
        self.status == 200
    }

    /// The server is already running another job.
    pub fn is_busy(&self) -> bool {
        self.status == 429
    }
}

/// Network and chunking settings for [`HttpTransferClient`](crate::HttpTransferClient).
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Maximum idle time between reads on the connection.
    pub read_timeout: Duration,
    /// Bytes read from the file per chunk.
    pub chunk_size: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(15 * 60),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferSettings {
    /// Chunk size clamped to the supported range.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
    }
}
