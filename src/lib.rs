// ============================================================================
// recordkv Library
// ============================================================================

//! A key-value store persisted into a remote record database.
//!
//! Mutations are staged in memory and coalesced: a burst of writes produces
//! one save per touched record once the burst has been quiet for the
//! configured debounce period. See [`coalescer`] for the flush rules and
//! [`RecordKeyValueStore`] for the key-value surface.

pub mod codec;
pub mod coalescer;
pub mod config;
pub mod core;
pub mod facade;
pub mod interface;
pub mod remote;

pub use codec::ValueCodec;
pub use coalescer::{
    CoalescerConfig, CoalescerStats, FlushObserver, FlushReport, FlushTrigger, PendingWrite,
    TracingFlushObserver, WriteCoalescer, WriteKind, WriteOutcome,
};
pub use config::{ReadConsistency, RecordLayout, StoreConfig, VALUE_FIELD};
pub use crate::core::{KvError, Record, RecordId, Result, Value};
pub use facade::{MemoryKeyValueStore, RecordKeyValueStore};
pub use interface::KeyValueStore;
pub use remote::{InMemoryRecordStore, RemoteCall, RemoteRecordStore};
