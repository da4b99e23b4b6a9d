//! Server status probing and the poll-until-idle loop.
//!
//! The processing server exposes `GET /status`; its body carries an idle
//! marker when no job is running. [`StatusClassifier`] owns that matching
//! rule, [`HttpStatusProber`] fetches and classifies, and [`Poller`] repeats
//! the probe on a cancellable timer until the server reports idle.

pub mod classify;
pub mod poller;
pub mod prober;

pub use classify::{
    DEFAULT_FAILURE_MARKER, DEFAULT_IDLE_MARKER, DEFAULT_SUCCESS_MARKER, JobVerdict, ServerState,
    StatusClassifier,
};
pub use poller::{PollOutcome, PollPolicy, Poller};
pub use prober::{DEFAULT_PROBE_TIMEOUT, HttpStatusProber, ProbeError, ProbeFuture, StatusProber};
