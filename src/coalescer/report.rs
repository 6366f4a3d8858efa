use serde::Serialize;
use tracing::{debug, warn};
use crate::core::{KvError, RecordId};
use super::WriteKind;

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlushTrigger {
    /// The quiet period elapsed with no new mutation.
    Debounce,
    /// The configured maximum deferral elapsed while mutations kept arriving.
    MaxDeferral,
    /// `flush_now` was called.
    Explicit,
    /// The coalescer was shut down or its handle dropped.
    Shutdown,
}

/// Outcome of one save or delete issued by a flush.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub id: RecordId,
    pub kind: WriteKind,
    pub error: Option<KvError>,
}

impl WriteOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Acknowledgement for one flush.
///
/// `flush_id` is 0 when nothing was pending and no flush took place.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    pub flush_id: u64,
    pub trigger: FlushTrigger,
    pub outcomes: Vec<WriteOutcome>,
}

impl FlushReport {
    pub(crate) fn empty(trigger: FlushTrigger) -> Self {
        Self {
            flush_id: 0,
            trigger,
            outcomes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// True when every write in the flush reached the remote store.
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(WriteOutcome::succeeded)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &WriteOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &WriteOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn outcome_for(&self, id: &RecordId) -> Option<&WriteOutcome> {
        self.outcomes.iter().find(|o| &o.id == id)
    }
}

/// Side channel for asynchronous write results.
///
/// Called from the flush task; implementations must not block.
pub trait FlushObserver: Send + Sync {
    fn write_failed(&self, id: &RecordId, kind: WriteKind, error: &KvError);

    fn flush_completed(&self, _report: &FlushReport) {}
}

/// Reports write failures through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFlushObserver;

impl FlushObserver for TracingFlushObserver {
    fn write_failed(&self, id: &RecordId, kind: WriteKind, error: &KvError) {
        warn!(record = %id, kind = ?kind, error = %error, "remote write failed, not retried");
    }

    fn flush_completed(&self, report: &FlushReport) {
        debug!(
            flush_id = report.flush_id,
            trigger = ?report.trigger,
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            "flush completed"
        );
    }
}
