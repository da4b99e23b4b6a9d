//! `GET /status` probe.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::classify::{ServerState, StatusClassifier};

/// Per-call timeout for a status probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level probe failure (connection refused, timeout, broken body).
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Boxed future returned by [`StatusProber::probe`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<ServerState, ProbeError>> + Send + 'a>>;

/// Fetches and classifies the server status once.
pub trait StatusProber: Send + Sync {
    fn probe<'a>(&'a self, url: &'a str) -> ProbeFuture<'a>;
}

/// reqwest-backed [`StatusProber`].
pub struct HttpStatusProber {
    http: reqwest::Client,
    classifier: StatusClassifier,
    timeout: Duration,
}

impl HttpStatusProber {
    /// Creates a prober; every call is bounded by `timeout`.
    pub fn new(classifier: StatusClassifier, timeout: Duration) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            classifier,
            timeout,
        })
    }

    pub fn classifier(&self) -> &StatusClassifier {
        &self.classifier
    }

    async fn get(&self, url: &str) -> Result<ServerState, ProbeError> {
        let resp = self.http.get(url).timeout(self.timeout).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        let state = self.classifier.classify(status, &body);
        debug!(url = %url, status, state = ?state, "status probed");
        Ok(state)
    }
}

impl StatusProber for HttpStatusProber {
    fn probe<'a>(&'a self, url: &'a str) -> ProbeFuture<'a> {
        Box::pin(self.get(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::JobVerdict;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Starts a mock `/status` endpoint answering once with `status` and `body`.
    async fn mock_server(status: u16, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/status");
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = stream.read(&mut buf).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buf[..n]).into_owned();

            let resp = format!(
                "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });

        (url, handle)
    }

    fn prober() -> HttpStatusProber {
        HttpStatusProber::new(StatusClassifier::default(), DEFAULT_PROBE_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn idle_success_body() {
        let (url, handle) = mock_server(200, r#"{"status": "idle_succes"}"#).await;
        let state = prober().probe(&url).await.unwrap();
        assert_eq!(state, ServerState::Idle(JobVerdict::Succeeded));

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /status "));
    }

    #[tokio::test]
    async fn idle_fail_body() {
        let (url, handle) = mock_server(200, r#"{"status": "idle_fail"}"#).await;
        let state = prober().probe(&url).await.unwrap();
        assert_eq!(state, ServerState::Idle(JobVerdict::Failed));
        handle.abort();
    }

    #[tokio::test]
    async fn running_body_is_busy() {
        let (url, handle) = mock_server(200, r#"{"status": "running"}"#).await;
        let state = prober().probe(&url).await.unwrap();
        assert_eq!(state, ServerState::Busy);
        handle.abort();
    }

    #[tokio::test]
    async fn service_unavailable() {
        let (url, handle) = mock_server(503, "Service Unavailable").await;
        let state = prober().probe(&url).await.unwrap();
        assert_eq!(state, ServerState::Unavailable { status: 503 });
        handle.abort();
    }

    #[tokio::test]
    async fn connection_refused_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = prober()
            .probe(&format!("http://127.0.0.1:{port}/status"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Http(_)));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            // Accept and hold the connection without answering.
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let prober =
            HttpStatusProber::new(StatusClassifier::default(), Duration::from_millis(200))
                .unwrap();
        let err = prober
            .probe(&format!("http://127.0.0.1:{port}/status"))
            .await
            .unwrap_err();
        let ProbeError::Http(e) = err;
        assert!(e.is_timeout());

        handle.abort();
    }
}
