//! Orchestrator states, events, and settings.

use std::fmt;

use splatscan_status::{JobVerdict, PollPolicy};

use crate::error::UploadError;

/// Identifies one traversal of the state machine (its generation number).
pub type RunId = u64;

/// Orchestrator state. Only the orchestrator writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    /// Status precheck in flight.
    Checking,
    /// Video transfer in flight.
    Uploading,
    /// Upload accepted; waiting for the server to go idle.
    Polling,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Checking => "checking server",
            Self::Uploading => "uploading",
            Self::Polling => "waiting for job",
        };
        f.write_str(s)
    }
}

/// Notification for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The server took the video and started a job. Polling follows.
    Accepted,
    /// The server went idle after an accepted upload.
    JobComplete(JobVerdict),
    /// The run ended with an error.
    Failed(UploadError),
}

impl Outcome {
    /// Whether the run ends with this outcome.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Accepted)
    }
}

/// Event emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    StateChanged { run: RunId, state: OrchestratorState },
    /// Upload percentage, strictly increasing within a run.
    Progress { run: RunId, percent: u8 },
    Outcome { run: RunId, outcome: Outcome },
}

impl UploadEvent {
    pub fn run(&self) -> RunId {
        match self {
            Self::StateChanged { run, .. }
            | Self::Progress { run, .. }
            | Self::Outcome { run, .. } => *run,
        }
    }
}

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub poll_policy: PollPolicy,
    /// Capacity of the event channel. Progress events beyond it are dropped.
    pub event_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_policy: PollPolicy::default(),
            event_capacity: 256,
        }
    }
}
