use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::sleep;
use uuid::Uuid;
use super::RemoteRecordStore;
use crate::core::{KvError, Record, RecordId, Result};

/// One call received by an [`InMemoryRecordStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Fetch(RecordId),
    Save(RecordId),
    Delete(RecordId),
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<RecordId, Record>,
    calls: Vec<RemoteCall>,
    failing_saves: HashSet<RecordId>,
    unreachable: bool,
    latency: Option<Duration>,
}

/// A record store living in process memory.
///
/// Clones share state, so a test can hand one clone to a key-value store and
/// keep another to inspect calls and inject faults.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency` before it is applied.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    /// Makes every save of `id` fail until [`clear_failures`](Self::clear_failures).
    pub async fn fail_saves_for(&self, id: &RecordId) {
        self.state.lock().await.failing_saves.insert(id.clone());
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.failing_saves.clear();
        state.unreachable = false;
    }

    /// Makes every call fail as if the network were down.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().await.unreachable = unreachable;
    }

    /// Stores a record verbatim, bypassing the call log and fault injection.
    pub async fn seed(&self, record: Record) {
        let mut state = self.state.lock().await;
        state.records.insert(record.id().clone(), record);
    }

    /// Reads a stored record without logging a call.
    pub async fn peek(&self, id: &RecordId) -> Option<Record> {
        self.state.lock().await.records.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn save_count(&self) -> usize {
        self.count_calls(|call| matches!(call, RemoteCall::Save(_))).await
    }

    pub async fn saves_for(&self, id: &RecordId) -> usize {
        self.count_calls(|call| matches!(call, RemoteCall::Save(saved) if saved == id))
            .await
    }

    pub async fn delete_count(&self) -> usize {
        self.count_calls(|call| matches!(call, RemoteCall::Delete(_))).await
    }

    pub async fn reset_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    async fn count_calls(&self, predicate: impl Fn(&RemoteCall) -> bool) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|&call| predicate(call))
            .count()
    }

    /// Logs the call, then waits out the configured latency.
    async fn begin(&self, call: RemoteCall) -> Result<()> {
        let latency = {
            let mut state = self.state.lock().await;
            state.calls.push(call);
            if state.unreachable {
                return Err(KvError::Remote("network unreachable".to_string()));
            }
            state.latency
        };
        if let Some(latency) = latency {
            sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteRecordStore for InMemoryRecordStore {
    async fn fetch(&self, id: &RecordId) -> Result<Option<Record>> {
        self.begin(RemoteCall::Fetch(id.clone())).await?;
        Ok(self.state.lock().await.records.get(id).cloned())
    }

    async fn save(&self, mut record: Record) -> Result<Record> {
        self.begin(RemoteCall::Save(record.id().clone())).await?;
        let mut state = self.state.lock().await;
        if state.failing_saves.contains(record.id()) {
            return Err(KvError::Remote(format!(
                "save rejected for record '{}'",
                record.id()
            )));
        }
        record.mark_saved(Uuid::new_v4().to_string(), Utc::now());
        state.records.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        self.begin(RemoteCall::Delete(id.clone())).await?;
        self.state.lock().await.records.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_stamps_metadata_and_logs_calls() {
        let store = InMemoryRecordStore::new();
        let id = RecordId::new("bool").unwrap();

        assert!(store.fetch(&id).await.unwrap().is_none());
        let saved = store.save(Record::new(id.clone(), "Value")).await.unwrap();
        assert!(saved.change_tag().is_some());
        assert!(saved.modified_at().is_some());

        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.is_empty().await);
        assert_eq!(
            store.calls().await,
            vec![
                RemoteCall::Fetch(id.clone()),
                RemoteCall::Save(id.clone()),
                RemoteCall::Delete(id.clone()),
                RemoteCall::Delete(id),
            ]
        );
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = InMemoryRecordStore::new();
        let a = RecordId::new("a").unwrap();
        let b = RecordId::new("b").unwrap();
        store.fail_saves_for(&a).await;

        assert!(store.save(Record::new(a.clone(), "Value")).await.is_err());
        assert!(store.save(Record::new(b.clone(), "Value")).await.is_ok());

        store.set_unreachable(true).await;
        let err = store.fetch(&b).await.unwrap_err();
        assert!(err.is_transient());

        store.clear_failures().await;
        assert!(store.save(Record::new(a.clone(), "Value")).await.is_ok());
        assert_eq!(store.saves_for(&a).await, 2);
    }
}
