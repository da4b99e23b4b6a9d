//! Multipart upload client.
//!
//! Async HTTP client using `reqwest`; the video part is a stream over the
//! file so memory use stays at one chunk regardless of video size.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::TryStreamExt;
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::progress::{ProgressCallback, ProgressReporter};
use crate::types::{TransferResponse, TransferSettings, UploadJob, VIDEO_CONTENT_TYPE, VIDEO_FIELD};
use crate::TransferError;

/// Boxed future returned by [`TransferClient::upload`].
pub type TransferFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransferResponse, TransferError>> + Send + 'a>>;

/// Performs a single multipart upload.
///
/// Implemented over HTTP by [`HttpTransferClient`]; the orchestrator only
/// sees this trait so it can be driven by mocks in tests.
pub trait TransferClient: Send + Sync {
    /// Uploads `job` to `url`, calling `progress` as bytes leave the file.
    ///
    /// Resolves with the HTTP status and body for any response the server
    /// sends. Never retries.
    fn upload<'a>(
        &'a self,
        url: &'a str,
        job: &'a UploadJob,
        progress: ProgressCallback,
    ) -> TransferFuture<'a>;
}

/// reqwest-backed [`TransferClient`].
pub struct HttpTransferClient {
    http: reqwest::Client,
    chunk_size: usize,
}

impl HttpTransferClient {
    /// Creates a client with the given timeouts and chunk size.
    pub fn new(settings: &TransferSettings) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .build()?;

        Ok(Self {
            http,
            chunk_size: settings.effective_chunk_size(),
        })
    }

    async fn send(
        &self,
        url: &str,
        job: &UploadJob,
        progress: ProgressCallback,
    ) -> Result<TransferResponse, TransferError> {
        let file = tokio::fs::File::open(job.path()).await?;
        let len = file.metadata().await?.len();
        if len != job.content_length() {
            return Err(TransferError::InvalidFile(format!(
                "{} changed size: expected {} bytes, found {len}",
                job.path().display(),
                job.content_length()
            )));
        }

        let reporter = Arc::new(ProgressReporter::new(len, progress));
        let chunk_reporter = Arc::clone(&reporter);
        let stream = ReaderStream::with_capacity(file, self.chunk_size)
            .inspect_ok(move |chunk| chunk_reporter.advance(chunk.len()));

        let video = Part::stream_with_length(Body::wrap_stream(stream), len)
            .file_name(job.file_name().to_string())
            .mime_str(VIDEO_CONTENT_TYPE)?;

        let mut form = Form::new().part(VIDEO_FIELD, video);
        for (key, value) in job.params() {
            form = form.text(key.clone(), value.clone());
        }

        info!(
            url = %url,
            file = %job.file_name(),
            bytes = len,
            fields = job.params().len(),
            "uploading video"
        );

        let resp = self.http.post(url).multipart(form).send().await?;
        let status = resp.status().as_u16();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(status, error = %e, "failed to read upload response body");
                String::new()
            }
        };
        reporter.finish();

        debug!(
            status,
            sent = reporter.bytes_sent(),
            "upload response received"
        );

        Ok(TransferResponse { status, body })
    }
}

impl TransferClient for HttpTransferClient {
    fn upload<'a>(
        &'a self,
        url: &'a str,
        job: &'a UploadJob,
        progress: ProgressCallback,
    ) -> TransferFuture<'a> {
        Box::pin(self.send(url, job, progress))
    }
}
