use std::collections::HashMap;
use std::sync::Arc;
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, debug, info, info_span, warn};
use crate::core::RecordId;
use crate::remote::RemoteRecordStore;
use super::{
    CoalescerConfig, CoalescerStats, FlushObserver, FlushReport, FlushTrigger, PendingWrite,
    WriteOutcome,
};

pub(super) enum Command {
    Stage(PendingWrite),
    FlushNow {
        ack: oneshot::Sender<FlushReport>,
    },
    Peek {
        id: RecordId,
        reply: oneshot::Sender<Option<PendingWrite>>,
    },
    Stats {
        reply: oneshot::Sender<CoalescerStats>,
    },
    Shutdown {
        ack: oneshot::Sender<FlushReport>,
    },
    /// Sent by a flush when one of its writes has completed.
    Settled {
        id: RecordId,
        generation: u64,
        failed: bool,
    },
}

#[derive(Debug, Clone)]
struct Staged {
    generation: u64,
    write: PendingWrite,
}

/// State owned by the coalescer task. Nothing outside the task touches it.
pub(super) struct CoalescerWorker {
    remote: Arc<dyn RemoteRecordStore>,
    observer: Arc<dyn FlushObserver>,
    config: CoalescerConfig,
    // Weak so the queue closes once every handle is gone.
    tx: mpsc::WeakUnboundedSender<Command>,
    pending: HashMap<RecordId, Staged>,
    in_flight: HashMap<RecordId, Staged>,
    // Flushes started by the timer or `flush_now`, awaited before the task exits.
    flushes: JoinSet<FlushReport>,
    deadline: Option<(Instant, FlushTrigger)>,
    first_dirty_at: Option<Instant>,
    next_generation: u64,
    next_flush_id: u64,
    stats: CoalescerStats,
}

impl CoalescerWorker {
    pub(super) fn new(
        remote: Arc<dyn RemoteRecordStore>,
        observer: Arc<dyn FlushObserver>,
        config: CoalescerConfig,
        tx: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            remote,
            observer,
            config,
            tx,
            pending: HashMap::new(),
            in_flight: HashMap::new(),
            flushes: JoinSet::new(),
            deadline: None,
            first_dirty_at: None,
            next_generation: 1,
            next_flush_id: 1,
            stats: CoalescerStats::default(),
        }
    }

    pub(super) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            let (deadline, trigger) = self
                .deadline
                .unwrap_or((Instant::now(), FlushTrigger::Debounce));
            let armed = self.deadline.is_some();

            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Shutdown { ack }) => {
                        let report = self.final_flush().await;
                        let _ = ack.send(report);
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        self.final_flush().await;
                        break;
                    }
                },
                _ = sleep_until(deadline), if armed => {
                    if let Some(flush) = self.begin_flush(trigger) {
                        self.flushes.spawn(flush.run(None));
                    }
                }
                Some(joined) = self.flushes.join_next(), if !self.flushes.is_empty() => {
                    log_join_error(joined);
                }
            }
        }
        debug!("write coalescer stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Stage(write) => self.stage(write),
            Command::FlushNow { ack } => match self.begin_flush(FlushTrigger::Explicit) {
                Some(flush) => {
                    self.flushes.spawn(flush.run(Some(ack)));
                }
                None => {
                    let _ = ack.send(FlushReport::empty(FlushTrigger::Explicit));
                }
            },
            Command::Peek { id, reply } => {
                let write = self
                    .pending
                    .get(&id)
                    .or_else(|| self.in_flight.get(&id))
                    .map(|staged| staged.write.clone());
                let _ = reply.send(write);
            }
            Command::Stats { reply } => {
                let mut stats = self.stats.clone();
                stats.pending = self.pending.len();
                stats.in_flight = self.in_flight.len();
                let _ = reply.send(stats);
            }
            Command::Settled {
                id,
                generation,
                failed,
            } => {
                if failed {
                    self.stats.writes_failed += 1;
                }
                if self.in_flight.get(&id).map(|s| s.generation) == Some(generation) {
                    self.in_flight.remove(&id);
                }
            }
            // handled by the run loop
            Command::Shutdown { .. } => {}
        }
    }

    fn stage(&mut self, write: PendingWrite) {
        let now = Instant::now();
        let generation = self.next_generation;
        self.next_generation += 1;
        self.stats.marks += 1;

        debug!(record = %write.id(), kind = ?write.kind(), generation, "staged write");
        self.pending
            .insert(write.id().clone(), Staged { generation, write });

        // Trailing edge: every mutation pushes the flush back by a full
        // quiet period, capped by the maximum deferral when one is set.
        let first_dirty_at = *self.first_dirty_at.get_or_insert(now);
        let mut deadline = (now + self.config.debounce, FlushTrigger::Debounce);
        if let Some(max_deferral) = self.config.max_deferral {
            let cap = first_dirty_at + max_deferral;
            if cap < deadline.0 {
                deadline = (cap, FlushTrigger::MaxDeferral);
            }
        }
        self.deadline = Some(deadline);
    }

    /// Flushes what is still pending and waits for every flush already
    /// running, so nothing is left in flight when the task exits.
    async fn final_flush(&mut self) -> FlushReport {
        let report = match self.begin_flush(FlushTrigger::Shutdown) {
            Some(flush) => flush.run(None).await,
            None => FlushReport::empty(FlushTrigger::Shutdown),
        };
        while let Some(joined) = self.flushes.join_next().await {
            log_join_error(joined);
        }
        report
    }

    /// Snapshots and clears the pending set. `None` if nothing was pending.
    fn begin_flush(&mut self, trigger: FlushTrigger) -> Option<Flush> {
        self.deadline = None;
        self.first_dirty_at = None;
        if self.pending.is_empty() {
            return None;
        }

        let flush_id = self.next_flush_id;
        self.next_flush_id += 1;

        let mut batch = Vec::with_capacity(self.pending.len());
        for (id, staged) in self.pending.drain() {
            self.in_flight.insert(id, staged.clone());
            batch.push(staged);
        }
        self.stats.flushes += 1;
        self.stats.writes_issued += batch.len() as u64;

        info!(flush_id, trigger = ?trigger, writes = batch.len(), "flushing pending writes");

        Some(Flush {
            flush_id,
            trigger,
            remote: self.remote.clone(),
            observer: self.observer.clone(),
            settle_tx: self.tx.upgrade(),
            batch,
        })
    }
}

fn log_join_error(joined: Result<FlushReport, tokio::task::JoinError>) {
    if let Err(err) = joined {
        warn!(error = %err, "flush task did not complete");
    }
}

/// One snapshot of the pending set on its way to the remote store.
struct Flush {
    flush_id: u64,
    trigger: FlushTrigger,
    remote: Arc<dyn RemoteRecordStore>,
    observer: Arc<dyn FlushObserver>,
    settle_tx: Option<mpsc::UnboundedSender<Command>>,
    batch: Vec<Staged>,
}

impl Flush {
    async fn run(self, ack: Option<oneshot::Sender<FlushReport>>) -> FlushReport {
        let span = info_span!("flush", flush_id = self.flush_id, trigger = ?self.trigger);
        let Flush {
            flush_id,
            trigger,
            remote,
            observer,
            settle_tx,
            batch,
        } = self;

        let writes = batch.into_iter().map(|staged| {
            let remote = remote.clone();
            let observer = observer.clone();
            let settle_tx = settle_tx.clone();
            async move {
                let id = staged.write.id().clone();
                let kind = staged.write.kind();
                let result = match staged.write {
                    PendingWrite::Save(record) => remote.save(record).await.map(|_| ()),
                    PendingWrite::Delete(record_id) => remote.delete(&record_id).await,
                };
                let error = result.err();

                if let Some(err) = &error {
                    observer.write_failed(&id, kind, err);
                }
                if let Some(tx) = &settle_tx {
                    let _ = tx.send(Command::Settled {
                        id: id.clone(),
                        generation: staged.generation,
                        failed: error.is_some(),
                    });
                }
                WriteOutcome { id, kind, error }
            }
        });

        let outcomes = join_all(writes).instrument(span).await;
        let report = FlushReport {
            flush_id,
            trigger,
            outcomes,
        };
        observer.flush_completed(&report);
        if let Some(ack) = ack {
            let _ = ack.send(report.clone());
        }
        report
    }
}
