//! Poll-until-idle loop.
//!
//! Sleeps, probes, repeats. Only an idle response or a transport failure
//! ends the loop on its own; busy and non-2xx responses keep it waiting.
//! Timing runs on tokio's clock and every wait is raced against a
//! [`CancellationToken`], so teardown is immediate and tests can run on
//! paused time.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{JobVerdict, ServerState};
use crate::prober::{ProbeError, StatusProber};

/// Timing policy for the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first probe, and between probes without backoff.
    pub interval: Duration,
    /// Multiplier applied to the delay after each probe (1.0 = fixed period).
    pub backoff_factor: f64,
    /// Upper bound for the backed-off delay.
    pub max_interval: Duration,
    /// Give up after this long. `None` polls until idle or failure.
    pub max_duration: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            backoff_factor: 1.0,
            max_interval: Duration::from_secs(60),
            max_duration: None,
        }
    }
}

impl PollPolicy {
    /// Fixed-period policy without a deadline.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Delay before probe number `probe` (1-based).
    pub fn delay_for_probe(&self, probe: u32) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        let exp = probe.saturating_sub(1).min(63) as i32;
        let cap = self.max_interval.max(self.interval);
        let secs = self.interval.as_secs_f64() * factor.powi(exp);
        Duration::try_from_secs_f64(secs).map_or(cap, |d| d.min(cap))
    }
}

/// How far out an unrepresentable wake-up or deadline is placed.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn instant_after(start: Instant, delay: Duration) -> Instant {
    start
        .checked_add(delay)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// How a poll loop ended.
#[derive(Debug)]
pub enum PollOutcome {
    /// The server reported idle.
    Complete { verdict: JobVerdict, probes: u32 },
    /// A probe failed at the transport level. Not retried.
    Failed { error: ProbeError, probes: u32 },
    /// `max_duration` elapsed before the server went idle.
    TimedOut { elapsed: Duration, probes: u32 },
    /// The cancellation token fired.
    Cancelled,
}

/// Repeats status probes until the server goes idle.
pub struct Poller {
    prober: Arc<dyn StatusProber>,
    policy: PollPolicy,
}

impl Poller {
    pub fn new(prober: Arc<dyn StatusProber>, policy: PollPolicy) -> Self {
        Self { prober, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Polls `url` until idle, failure, timeout, or cancellation.
    ///
    /// The first probe fires no earlier than one interval after the call.
    /// Probes never overlap.
    pub async fn run(&self, url: &str, cancel: &CancellationToken) -> PollOutcome {
        let started = Instant::now();
        // An unrepresentable deadline is the same as none.
        let deadline = self
            .policy
            .max_duration
            .and_then(|d| started.checked_add(d));
        let mut probes: u32 = 0;

        loop {
            let wake = instant_after(Instant::now(), self.policy.delay_for_probe(probes + 1));

            if let Some(deadline) = deadline
                && wake > deadline
            {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return PollOutcome::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => {}
                }
                let elapsed = started.elapsed();
                warn!(url = %url, probes, elapsed_secs = elapsed.as_secs(), "polling timed out");
                return PollOutcome::TimedOut { elapsed, probes };
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = tokio::time::sleep_until(wake) => {}
            }

            probes += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                r = self.prober.probe(url) => r,
            };

            match result {
                Ok(ServerState::Idle(verdict)) => {
                    info!(url = %url, probes, verdict = ?verdict, "server idle, job finished");
                    return PollOutcome::Complete { verdict, probes };
                }
                Ok(state) => {
                    debug!(url = %url, probe = probes, state = ?state, "job still running");
                }
                Err(error) => {
                    warn!(url = %url, probe = probes, error = %error, "status probe failed");
                    return PollOutcome::Failed { error, probes };
                }
            }
        }
    }
}
