//! Debounced write coalescing in front of a [`RemoteRecordStore`].
//!
//! A single task owns the pending set. Mutations arrive as messages, re-arm a
//! trailing-edge timer, and are flushed together once the timer elapses
//! without further mutation. Each flush issues one save (or delete) per
//! record, concurrently, and reports every outcome independently. Failed
//! writes are reported but never re-queued: the caller has to write the key
//! again to retry.
//!
//! Two writes to the same identity racing each other (a debounce flush and a
//! `flush_now`, say) are not ordered; the last one to reach the remote store
//! wins. Callers must not mutate one key from several tasks concurrently.

mod report;
mod worker;

pub use report::{FlushObserver, FlushReport, FlushTrigger, TracingFlushObserver, WriteOutcome};

use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::core::{KvError, Record, RecordId, Result};
use crate::remote::RemoteRecordStore;
use worker::{Command, CoalescerWorker};

/// Timer settings for a [`WriteCoalescer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescerConfig {
    /// Quiet period that must pass with no mutation before a flush.
    pub debounce: Duration,
    /// Upper bound on how long a mutation may wait while others keep
    /// arriving. `None` defers indefinitely until quiescence.
    pub max_deferral: Option<Duration>,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1_000),
            max_deferral: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteKind {
    Save,
    Delete,
}

/// A write waiting in the pending set or in flight to the remote store.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    Save(Record),
    Delete(RecordId),
}

impl PendingWrite {
    pub fn id(&self) -> &RecordId {
        match self {
            Self::Save(record) => record.id(),
            Self::Delete(id) => id,
        }
    }

    pub fn kind(&self) -> WriteKind {
        match self {
            Self::Save(_) => WriteKind::Save,
            Self::Delete(_) => WriteKind::Delete,
        }
    }
}

/// Counters kept by the coalescer task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoalescerStats {
    pub marks: u64,
    pub flushes: u64,
    pub writes_issued: u64,
    pub writes_failed: u64,
    pub pending: usize,
    pub in_flight: usize,
}

/// Handle to the coalescer task.
///
/// Dropping the handle closes the task's queue; the task flushes whatever is
/// still pending, waits for running flushes, and exits. Use [`shutdown`](Self::shutdown) to wait for that
/// final flush.
pub struct WriteCoalescer {
    tx: mpsc::UnboundedSender<Command>,
    join_handle: JoinHandle<()>,
}

impl WriteCoalescer {
    /// Starts the coalescer task on the current tokio runtime, reporting
    /// failures through [`TracingFlushObserver`].
    pub fn spawn(remote: Arc<dyn RemoteRecordStore>, config: CoalescerConfig) -> Result<Self> {
        Self::spawn_with_observer(remote, config, Arc::new(TracingFlushObserver))
    }

    pub fn spawn_with_observer(
        remote: Arc<dyn RemoteRecordStore>,
        config: CoalescerConfig,
        observer: Arc<dyn FlushObserver>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            KvError::Config(format!("write coalescer needs a tokio runtime: {}", e))
        })?;
        if config.debounce.is_zero() {
            return Err(KvError::Config("debounce must be greater than zero".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = CoalescerWorker::new(remote, observer, config, tx.downgrade());
        let join_handle = runtime.spawn(worker.run(rx));

        Ok(Self { tx, join_handle })
    }

    /// Queues `record` for saving and re-arms the debounce timer.
    ///
    /// Never waits. A record already pending under the same identity is
    /// replaced, so the flush observes the last write.
    pub fn mark_dirty(&self, record: Record) -> Result<()> {
        self.send(Command::Stage(PendingWrite::Save(record)))
    }

    /// Queues deletion of `id`, replacing any pending save of it.
    pub fn mark_deleted(&self, id: RecordId) -> Result<()> {
        self.send(Command::Stage(PendingWrite::Delete(id)))
    }

    /// Flushes everything pending now, bypassing the timer, and waits for
    /// every write of that flush to settle.
    pub async fn flush_now(&self) -> Result<FlushReport> {
        let (ack, rx) = oneshot::channel();
        self.send(Command::FlushNow { ack })?;
        rx.await.map_err(|_| KvError::CoalescerClosed)
    }

    /// The newest write for `id` not yet confirmed by the remote store.
    pub async fn pending_write(&self, id: &RecordId) -> Result<Option<PendingWrite>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Peek {
            id: id.clone(),
            reply,
        })?;
        rx.await.map_err(|_| KvError::CoalescerClosed)
    }

    pub async fn stats(&self) -> Result<CoalescerStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply })?;
        rx.await.map_err(|_| KvError::CoalescerClosed)
    }

    /// Flushes whatever is pending, waits for it and for every flush already
    /// in flight, and stops the task. The report covers the final flush only.
    pub async fn shutdown(self) -> Result<FlushReport> {
        let (ack, rx) = oneshot::channel();
        self.send(Command::Shutdown { ack })?;
        let report = rx.await.map_err(|_| KvError::CoalescerClosed)?;
        self.join_handle
            .await
            .map_err(|err| KvError::Worker(format!("coalescer join: {}", err)))?;
        Ok(report)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| KvError::CoalescerClosed)
    }
}
