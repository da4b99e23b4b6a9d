use std::sync::{Arc, Mutex, PoisonError};

/// Callback invoked with the upload percentage (0–100).
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Returns `floor(100 * sent / total)`, clamped to 100.
///
/// A zero-length transfer is reported as complete.
pub fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let sent = sent.min(total) as u128;
    (sent * 100 / total as u128) as u8
}

/// Counts bytes handed to the connection and reports percentage changes.
///
/// The callback fires only when the percentage moves, so the reported
/// values are strictly increasing and at most 101 callbacks fire per
/// transfer.
pub struct ProgressReporter {
    inner: Mutex<ReporterInner>,
    callback: ProgressCallback,
}

struct ReporterInner {
    total: u64,
    sent: u64,
    last: Option<u8>,
}

impl ProgressReporter {
    /// Creates a reporter for a transfer of `total` bytes.
    pub fn new(total: u64, callback: ProgressCallback) -> Self {
        Self {
            inner: Mutex::new(ReporterInner {
                total,
                sent: 0,
                last: None,
            }),
            callback,
        }
    }

    /// Records `bytes` more bytes sent.
    pub fn advance(&self, bytes: usize) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.sent = s.sent.saturating_add(bytes as u64).min(s.total);
        let percent = percent_of(s.sent, s.total);
        if s.last.is_some_and(|last| last >= percent) {
            return;
        }
        s.last = Some(percent);
        // Called under the lock so concurrent advances cannot reorder values.
        (self.callback)(percent);
    }

    /// Marks the body as fully sent.
    ///
    /// Only has an effect for zero-length transfers, which never see a
    /// chunk: they report 100 exactly once.
    pub fn finish(&self) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if s.total == 0 && s.last.is_none() {
            s.last = Some(100);
            (self.callback)(100);
        }
    }

    /// Bytes counted so far.
    pub fn bytes_sent(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
    }

    /// Last percentage reported, if any.
    pub fn last_percent(&self) -> Option<u8> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
    }
}
