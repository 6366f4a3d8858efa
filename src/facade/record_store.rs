use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use crate::codec::ValueCodec;
use crate::coalescer::{
    CoalescerStats, FlushObserver, FlushReport, PendingWrite, TracingFlushObserver,
    WriteCoalescer,
};
use crate::config::{ReadConsistency, RecordLayout, StoreConfig, VALUE_FIELD};
use crate::core::{KvError, Record, RecordId, Result, Value};
use crate::interface::KeyValueStore;
use crate::remote::RemoteRecordStore;

/// Key-value store persisted into a remote record database.
///
/// Writes are encoded, applied to the newest known copy of their record and
/// handed to a [`WriteCoalescer`], which saves them after a quiet period.
/// Reads block on the remote store unless the record has an unflushed write
/// and reads are configured as [`ReadConsistency::ReadYourWrites`].
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// # use recordkv::{InMemoryRecordStore, KeyValueStore, RecordKeyValueStore, StoreConfig};
/// # #[tokio::main]
/// # async fn main() -> recordkv::Result<()> {
/// let remote = InMemoryRecordStore::new();
/// let store = RecordKeyValueStore::open(Arc::new(remote.clone()), StoreConfig::default())?;
///
/// store.set_bool("bool", true).await?;
/// store.set_string("string", Some("string")).await?;
/// assert!(store.boolean("bool").await);
///
/// store.close().await?;
/// assert_eq!(remote.len().await, 2);
/// # Ok(())
/// # }
/// ```
pub struct RecordKeyValueStore {
    remote: Arc<dyn RemoteRecordStore>,
    coalescer: WriteCoalescer,
    config: StoreConfig,
    // Serializes read-modify-write of records so concurrent sets sharing a
    // record do not drop each other's fields.
    write_gate: Mutex<()>,
}

impl RecordKeyValueStore {
    /// Opens a store on the current tokio runtime.
    pub fn open(remote: Arc<dyn RemoteRecordStore>, config: StoreConfig) -> Result<Self> {
        Self::open_with_observer(remote, config, Arc::new(TracingFlushObserver))
    }

    /// Opens a store whose asynchronous write failures go to `observer`.
    pub fn open_with_observer(
        remote: Arc<dyn RemoteRecordStore>,
        config: StoreConfig,
        observer: Arc<dyn FlushObserver>,
    ) -> Result<Self> {
        config.validate()?;
        let coalescer =
            WriteCoalescer::spawn_with_observer(remote.clone(), config.coalescer_config(), observer)?;

        info!(
            layout = ?config.layout,
            debounce_ms = config.debounce_ms,
            consistency = ?config.consistency,
            "opened record key-value store"
        );

        Ok(Self {
            remote,
            coalescer,
            config,
            write_gate: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Like [`KeyValueStore::value`], but reports why a value could not be read.
    pub async fn try_value(&self, key: &str) -> Result<Option<Value>> {
        let (id, field) = self.locate(key)?;
        let Some(record) = self.read_record(&id).await? else {
            return Ok(None);
        };
        record
            .field(field)
            .map(ValueCodec::decode)
            .transpose()
            .map_err(|err| with_key(key, err))
    }

    /// Whether `key` holds a field, without decoding it.
    pub async fn try_has(&self, key: &str) -> Result<bool> {
        let (id, field) = self.locate(key)?;
        Ok(self
            .read_record(&id)
            .await?
            .is_some_and(|record| record.has_field(field)))
    }

    /// Flushes pending writes now and waits for the remote store to answer.
    pub async fn flush_now(&self) -> Result<FlushReport> {
        self.coalescer.flush_now().await
    }

    pub async fn stats(&self) -> Result<CoalescerStats> {
        self.coalescer.stats().await
    }

    /// Flushes pending writes and stops the coalescer.
    pub async fn close(self) -> Result<FlushReport> {
        self.coalescer.shutdown().await
    }

    /// Maps a key to its record and the field holding its value.
    fn locate<'k>(&self, key: &'k str) -> Result<(RecordId, &'k str)> {
        match &self.config.layout {
            RecordLayout::PerKey { .. } => Ok((RecordId::new(key)?, VALUE_FIELD)),
            RecordLayout::SingleRecord { record_name, .. } => {
                if key.trim().is_empty() {
                    return Err(KvError::InvalidKey("key must not be empty".to_string()));
                }
                Ok((RecordId::new(record_name.as_str())?, key))
            }
        }
    }

    async fn fetch(&self, id: &RecordId) -> Result<Option<Record>> {
        match self.config.fetch_timeout_duration() {
            Some(limit) => timeout(limit, self.remote.fetch(id))
                .await
                .map_err(|_| KvError::Timeout(limit.as_millis() as u64))?,
            None => self.remote.fetch(id).await,
        }
    }

    /// The newest copy of a record: an unflushed write if there is one,
    /// otherwise whatever the remote store holds.
    async fn working_record(&self, id: &RecordId) -> Result<Option<Record>> {
        match self.coalescer.pending_write(id).await? {
            Some(PendingWrite::Save(record)) => Ok(Some(record)),
            Some(PendingWrite::Delete(_)) => Ok(None),
            None => self.fetch(id).await,
        }
    }

    async fn read_record(&self, id: &RecordId) -> Result<Option<Record>> {
        match self.config.consistency {
            ReadConsistency::ReadYourWrites => self.working_record(id).await,
            ReadConsistency::Eventual => self.fetch(id).await,
        }
    }

    async fn write_value(&self, key: &str, value: &Value) -> Result<()> {
        let (id, field) = self.locate(key)?;
        let bytes = self
            .config
            .codec
            .encode(value)
            .map_err(|err| with_key(key, err))?;

        let _gate = self.write_gate.lock().await;
        let mut record = match self.working_record(&id).await? {
            Some(record) => record,
            None => Record::new(id, self.config.layout.record_type()),
        };
        record.set_field(field, bytes);
        debug!(key, record = %record.id(), "value set");
        self.coalescer.mark_dirty(record)
    }

    async fn remove_key(&self, key: &str) -> Result<()> {
        let (id, field) = self.locate(key)?;

        let _gate = self.write_gate.lock().await;
        let Some(mut record) = self.working_record(&id).await? else {
            debug!(key, "remove of absent key ignored");
            return Ok(());
        };
        match self.config.layout {
            RecordLayout::PerKey { .. } => self.coalescer.mark_deleted(id),
            RecordLayout::SingleRecord { .. } => {
                if record.remove_field(field).is_none() {
                    debug!(key, "remove of absent key ignored");
                    return Ok(());
                }
                self.coalescer.mark_dirty(record)
            }
        }
    }
}

fn with_key(key: &str, err: KvError) -> KvError {
    match err {
        KvError::Encode(reason) => KvError::Encode(format!("key '{}': {}", key, reason)),
        KvError::Decode(reason) => KvError::Decode(format!("key '{}': {}", key, reason)),
        other => other,
    }
}

#[async_trait]
impl KeyValueStore for RecordKeyValueStore {
    async fn value(&self, key: &str) -> Option<Value> {
        match self.try_value(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "read failed, treating key as absent");
                None
            }
        }
    }

    async fn has(&self, key: &str) -> bool {
        match self.try_has(key).await {
            Ok(present) => present,
            Err(err) => {
                warn!(key, error = %err, "read failed, treating key as absent");
                false
            }
        }
    }

    async fn set_value(&self, key: &str, value: Option<Value>) -> Result<()> {
        match value {
            Some(value) => self.write_value(key, &value).await,
            None => self.remove_key(key).await,
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.remove_key(key).await
    }
}
