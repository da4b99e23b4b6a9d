//! Single-flight upload orchestrator.
//!
//! One run walks `Idle -> Checking -> Uploading -> Polling -> Idle`, with any
//! failure returning straight to `Idle`. Runs are numbered; every state
//! write and event emission checks the run number under the slot lock, so a
//! task left over from a cancelled run can never touch the next one.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures_util::FutureExt;
use splatscan_status::{PollOutcome, PollPolicy, Poller, ServerState, StatusProber};
use splatscan_transfer::{ProgressCallback, TransferClient, UploadJob};
use tokio::sync::mpsc;
use tokio::sync::mpsc::OwnedPermit;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::target::UploadTarget;
use crate::types::{OrchestratorSettings, OrchestratorState, Outcome, RunId, UploadEvent};

/// Lifecycle events a run can emit: `Checking`, `Uploading`, `Polling`,
/// `Accepted`, `Idle` and the terminal outcome. Channel slots for all of them
/// are reserved when the run starts; progress only gets what is left over.
const RUN_EVENT_SLOTS: usize = 6;

/// Coordinates precheck, transfer, and polling for one upload at a time.
pub struct UploadOrchestrator {
    inner: Arc<Inner>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

struct Inner {
    slot: Mutex<Slot>,
    target: RwLock<UploadTarget>,
    prober: Arc<dyn StatusProber>,
    transfer: Arc<dyn TransferClient>,
    poll_policy: PollPolicy,
    events_tx: mpsc::Sender<UploadEvent>,
}

struct Slot {
    state: OrchestratorState,
    generation: RunId,
    active: Option<ActiveRun>,
}

struct ActiveRun {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    reserved: Vec<OwnedPermit<UploadEvent>>,
}

/// Endpoints resolved when the run starts.
struct RunUrls {
    upload: String,
    status: String,
}

impl UploadOrchestrator {
    pub fn new(
        prober: Arc<dyn StatusProber>,
        transfer: Arc<dyn TransferClient>,
        target: UploadTarget,
        settings: OrchestratorSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(settings.event_capacity.max(RUN_EVENT_SLOTS));
        let inner = Inner {
            slot: Mutex::new(Slot {
                state: OrchestratorState::Idle,
                generation: 0,
                active: None,
            }),
            target: RwLock::new(target),
            prober,
            transfer,
            poll_policy: settings.poll_policy,
            events_tx,
        };
        Self {
            inner: Arc::new(inner),
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn state(&self) -> OrchestratorState {
        self.inner.lock().state
    }

    /// Id of the run in progress, if any.
    pub fn current_run(&self) -> Option<RunId> {
        let slot = self.inner.lock();
        slot.active.as_ref().map(|_| slot.generation)
    }

    pub fn target(&self) -> UploadTarget {
        self.inner
            .target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the target. A run already in progress keeps the endpoints it
    /// started with.
    pub fn set_target(&self, target: UploadTarget) {
        info!(target = %target, "upload target changed");
        *self
            .inner
            .target
            .write()
            .unwrap_or_else(PoisonError::into_inner) = target;
    }

    /// Starts a run for `job` and returns its id.
    ///
    /// Fails with [`UploadError::ClientBusy`] unless the orchestrator is
    /// idle; nothing is sent in that case. Must be called from within a
    /// tokio runtime.
    pub fn request_upload(&self, job: UploadJob) -> Result<RunId, UploadError> {
        let mut slot = self.inner.lock();
        if slot.state != OrchestratorState::Idle {
            warn!(state = %slot.state, "upload rejected, a run is in progress");
            return Err(UploadError::ClientBusy);
        }

        slot.generation += 1;
        let run = slot.generation;
        let urls = {
            let target = self
                .inner
                .target
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            RunUrls {
                upload: target.upload_url(),
                status: target.status_url(),
            }
        };
        info!(
            run,
            file = %job.file_name(),
            bytes = job.content_length(),
            upload_url = %urls.upload,
            "starting upload"
        );

        let mut reserved = self.inner.reserve_run_events(run);
        slot.state = OrchestratorState::Checking;
        Inner::emit_lifecycle(
            &self.inner.events_tx,
            &mut reserved,
            UploadEvent::StateChanged {
                run,
                state: OrchestratorState::Checking,
            },
        );

        // Spawned under the lock so the handle is stored before the task can
        // finish and clear the slot.
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Inner::supervise(
            Arc::clone(&self.inner),
            run,
            job,
            urls,
            cancel.clone(),
        ));
        slot.active = Some(ActiveRun {
            cancel,
            task,
            reserved,
        });
        Ok(run)
    }

    /// Abandons the run in progress. Returns `false` when idle.
    ///
    /// The orchestrator is idle when this returns and emits nothing more for
    /// the abandoned run.
    pub fn cancel(&self) -> bool {
        let mut slot = self.inner.lock();
        let Some(active) = slot.active.take() else {
            return false;
        };
        let run = slot.generation;
        slot.generation += 1;
        slot.state = OrchestratorState::Idle;
        active.cancel.cancel();
        active.task.abort();
        info!(run, "upload cancelled");
        true
    }
}

impl Drop for UploadOrchestrator {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `drive` and turns a panic inside it into a failed outcome, so the
    /// slot always returns to `Idle`.
    async fn supervise(
        self: Arc<Self>,
        run: RunId,
        job: UploadJob,
        urls: RunUrls,
        cancel: CancellationToken,
    ) {
        let driven = AssertUnwindSafe(Arc::clone(&self).drive(run, job, urls, cancel))
            .catch_unwind()
            .await;
        if let Err(panic) = driven {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "run task panicked".into());
            self.finish(run, Outcome::Failed(UploadError::Aborted(msg)));
        }
    }

    async fn drive(
        self: Arc<Self>,
        run: RunId,
        job: UploadJob,
        urls: RunUrls,
        cancel: CancellationToken,
    ) {
        let precheck = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            r = self.prober.probe(&urls.status) => r,
        };
        match precheck {
            Ok(ServerState::Idle(_)) => {}
            Ok(ServerState::Busy) => {
                self.finish(run, Outcome::Failed(UploadError::ServerBusy));
                return;
            }
            Ok(ServerState::Unavailable { status }) => {
                let msg = format!("status endpoint returned HTTP {status}");
                self.finish(run, Outcome::Failed(UploadError::ProbeFailed(msg)));
                return;
            }
            Err(e) => {
                self.finish(run, Outcome::Failed(UploadError::ProbeFailed(e.to_string())));
                return;
            }
        }

        if !self.transition(run, OrchestratorState::Uploading) {
            return;
        }

        let progress = self.progress_sink(run);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            r = self.transfer.upload(&urls.upload, &job, progress) => r,
        };
        match response {
            Ok(resp) if resp.is_accepted() => {}
            Ok(resp) if resp.is_busy() => {
                self.finish(run, Outcome::Failed(UploadError::ServerBusy));
                return;
            }
            Ok(resp) => {
                debug!(run, status = resp.status, body = %resp.body, "upload rejected");
                let msg = format!("server returned HTTP {}", resp.status);
                self.finish(run, Outcome::Failed(UploadError::UploadFailed(msg)));
                return;
            }
            Err(e) => {
                self.finish(run, Outcome::Failed(UploadError::UploadFailed(e.to_string())));
                return;
            }
        }

        if !self.accept(run) {
            return;
        }

        let poller = Poller::new(Arc::clone(&self.prober), self.poll_policy.clone());
        let outcome = match poller.run(&urls.status, &cancel).await {
            PollOutcome::Complete { verdict, .. } => Outcome::JobComplete(verdict),
            PollOutcome::Failed { error, .. } => {
                Outcome::Failed(UploadError::PollError(error.to_string()))
            }
            PollOutcome::TimedOut { elapsed, .. } => {
                Outcome::Failed(UploadError::PollTimeout { elapsed })
            }
            PollOutcome::Cancelled => return,
        };
        self.finish(run, outcome);
    }

    fn reserve_run_events(&self, run: RunId) -> Vec<OwnedPermit<UploadEvent>> {
        let mut reserved = Vec::with_capacity(RUN_EVENT_SLOTS);
        while reserved.len() < RUN_EVENT_SLOTS {
            match self.events_tx.clone().try_reserve_owned() {
                Ok(permit) => reserved.push(permit),
                Err(TrySendError::Full(_)) => {
                    warn!(
                        run,
                        reserved = reserved.len(),
                        "event channel backlog, lifecycle events may be dropped"
                    );
                    break;
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
        reserved
    }

    /// Moves `run` to `state`. Returns `false` if `run` is no longer current.
    fn transition(&self, run: RunId, state: OrchestratorState) -> bool {
        let mut slot = self.lock();
        let Some(active) = current(&mut slot, run) else {
            return false;
        };
        debug!(run, state = %state, "state changed");
        Self::emit_lifecycle(
            &self.events_tx,
            &mut active.reserved,
            UploadEvent::StateChanged { run, state },
        );
        slot.state = state;
        true
    }

    /// Enters `Polling` and reports the accepted upload in one step.
    fn accept(&self, run: RunId) -> bool {
        let mut slot = self.lock();
        let Some(active) = current(&mut slot, run) else {
            return false;
        };
        info!(run, "upload accepted, waiting for job");
        for event in [
            UploadEvent::StateChanged {
                run,
                state: OrchestratorState::Polling,
            },
            UploadEvent::Outcome {
                run,
                outcome: Outcome::Accepted,
            },
        ] {
            Self::emit_lifecycle(&self.events_tx, &mut active.reserved, event);
        }
        slot.state = OrchestratorState::Polling;
        true
    }

    /// Ends `run` with `outcome`. No-op if `run` is no longer current.
    fn finish(&self, run: RunId, outcome: Outcome) {
        let mut slot = self.lock();
        if current(&mut slot, run).is_none() {
            return;
        }
        // Dropping the handle detaches this task; it is about to return.
        let Some(mut active) = slot.active.take() else {
            return;
        };
        slot.state = OrchestratorState::Idle;
        match &outcome {
            Outcome::Failed(e) => warn!(run, error = %e, "upload run failed"),
            _ => info!(run, outcome = ?outcome, "upload run finished"),
        }
        for event in [
            UploadEvent::StateChanged {
                run,
                state: OrchestratorState::Idle,
            },
            UploadEvent::Outcome { run, outcome },
        ] {
            Self::emit_lifecycle(&self.events_tx, &mut active.reserved, event);
        }
    }

    fn progress_sink(self: &Arc<Self>, run: RunId) -> ProgressCallback {
        let inner = Arc::clone(self);
        Arc::new(move |percent| inner.emit_progress(run, percent))
    }

    /// Progress goes out only while there is spare room; a full channel
    /// drops it.
    fn emit_progress(&self, run: RunId, percent: u8) {
        let mut slot = self.lock();
        if current(&mut slot, run).is_none() {
            return;
        }
        match self.events_tx.try_send(UploadEvent::Progress { run, percent }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(run, percent, "event channel full, progress dropped");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Sends on a reserved slot, or falls back to a non-blocking send when
    /// the reservation ran out. Callers hold the slot lock.
    fn emit_lifecycle(
        tx: &mpsc::Sender<UploadEvent>,
        reserved: &mut Vec<OwnedPermit<UploadEvent>>,
        event: UploadEvent,
    ) {
        if let Some(permit) = reserved.pop() {
            permit.send(event);
            return;
        }
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(run = event.run(), event = ?event, "event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// The active run, if it is still `run`.
fn current(slot: &mut Slot, run: RunId) -> Option<&mut ActiveRun> {
    if slot.generation != run {
        return None;
    }
    slot.active.as_mut()
}
