//! Classification of `/status` responses.

use serde::{Deserialize, Serialize};

/// Substring the server embeds in its status body when no job is running.
pub const DEFAULT_IDLE_MARKER: &str = "idle";

/// Marker for "idle, last job succeeded" (the server's own spelling).
pub const DEFAULT_SUCCESS_MARKER: &str = "idle_succes";

/// Marker for "idle, last job failed".
pub const DEFAULT_FAILURE_MARKER: &str = "idle_fail";

/// How the last job ended, as far as the idle response tells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobVerdict {
    Succeeded,
    Failed,
    /// Idle marker present but neither verdict marker.
    Unknown,
}

/// Server state observed by one probe. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    /// 2xx with the idle marker.
    Idle(JobVerdict),
    /// 2xx without the idle marker: a job is running.
    Busy,
    /// Non-2xx response.
    Unavailable { status: u16 },
}

impl ServerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle(_))
    }
}

/// Substring rules that turn a status response into a [`ServerState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusClassifier {
    pub idle_marker: String,
    pub success_marker: String,
    pub failure_marker: String,
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self {
            idle_marker: DEFAULT_IDLE_MARKER.into(),
            success_marker: DEFAULT_SUCCESS_MARKER.into(),
            failure_marker: DEFAULT_FAILURE_MARKER.into(),
        }
    }
}

impl StatusClassifier {
    /// Default rules with a custom idle marker.
    pub fn with_idle_marker(marker: impl Into<String>) -> Self {
        Self {
            idle_marker: marker.into(),
            ..Self::default()
        }
    }

    /// Classifies a response from its status code and body.
    pub fn classify(&self, status: u16, body: &str) -> ServerState {
        if !(200..300).contains(&status) {
            return ServerState::Unavailable { status };
        }
        if !body.contains(self.idle_marker.as_str()) {
            return ServerState::Busy;
        }
        ServerState::Idle(self.verdict(body))
    }

    fn verdict(&self, body: &str) -> JobVerdict {
        if !self.failure_marker.is_empty() && body.contains(self.failure_marker.as_str()) {
            JobVerdict::Failed
        } else if !self.success_marker.is_empty() && body.contains(self.success_marker.as_str()) {
            JobVerdict::Succeeded
        } else {
            JobVerdict::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_marker_in_2xx_body_is_idle() {
        let c = StatusClassifier::default();
        assert!(c.classify(200, "server is idle").is_idle());
        assert!(c.classify(204, "...idle...").is_idle());
    }

    #[test]
    fn busy_body_is_not_idle() {
        let c = StatusClassifier::default();
        assert_eq!(c.classify(200, "busy"), ServerState::Busy);
        assert_eq!(c.classify(200, r#"{"status": "running"}"#), ServerState::Busy);
        assert_eq!(c.classify(200, ""), ServerState::Busy);
    }

    #[test]
    fn non_2xx_is_unavailable_even_with_marker() {
        let c = StatusClassifier::default();
        assert_eq!(
            c.classify(503, "idle"),
            ServerState::Unavailable { status: 503 }
        );
        assert_eq!(c.classify(404, ""), ServerState::Unavailable { status: 404 });
        assert_eq!(c.classify(302, "idle"), ServerState::Unavailable { status: 302 });
    }

    #[test]
    fn verdict_from_server_bodies() {
        let c = StatusClassifier::default();
        assert_eq!(
            c.classify(200, r#"{"status": "idle_succes"}"#),
            ServerState::Idle(JobVerdict::Succeeded)
        );
        assert_eq!(
            c.classify(200, r#"{"status": "idle_fail"}"#),
            ServerState::Idle(JobVerdict::Failed)
        );
        assert_eq!(
            c.classify(200, r#"{"status": "idle"}"#),
            ServerState::Idle(JobVerdict::Unknown)
        );
    }

    #[test]
    fn custom_idle_marker() {
        let c = StatusClassifier::with_idle_marker("READY");
        assert!(c.classify(200, "READY").is_idle());
        assert_eq!(c.classify(200, "idle"), ServerState::Busy);
    }

    #[test]
    fn empty_verdict_markers_yield_unknown() {
        let c = StatusClassifier {
            success_marker: String::new(),
            failure_marker: String::new(),
            ..StatusClassifier::default()
        };
        assert_eq!(
            c.classify(200, "idle_fail"),
            ServerState::Idle(JobVerdict::Unknown)
        );
    }
}
