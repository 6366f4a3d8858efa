//! The remote record database the key-value store persists into.

mod memory;

pub use memory::{InMemoryRecordStore, RemoteCall};

use async_trait::async_trait;
use crate::core::{Record, RecordId, Result};

/// An asynchronous key → record database.
///
/// Calls are independent of each other: nothing orders a `save` against a
/// `fetch` or `delete` unless the caller awaits one before issuing the next.
/// The store guarantees atomicity per record only.
#[async_trait]
pub trait RemoteRecordStore: Send + Sync {
    /// Fetch a record. An absent record is `Ok(None)`, not an error.
    async fn fetch(&self, id: &RecordId) -> Result<Option<Record>>;

    /// Persist a record, returning it as stored (with server metadata).
    async fn save(&self, record: Record) -> Result<Record>;

    /// Delete a record. Deleting an absent record is acknowledged.
    async fn delete(&self, id: &RecordId) -> Result<()>;
}
