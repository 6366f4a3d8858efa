use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::{KvError, Result};

/// Identity of a record in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(KvError::InvalidKey(
                "record name must not be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RecordId {
    type Error = KvError;

    fn try_from(name: String) -> Result<Self> {
        Self::new(name)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The remote store's unit of persistence.
///
/// Fields hold encoded values (see [`crate::codec`]). The identity is fixed at
/// construction; `change_tag` and `modified_at` belong to the remote store and
/// are stamped when a save succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    record_type: String,
    fields: BTreeMap<String, Vec<u8>>,
    change_tag: Option<String>,
    modified_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(id: RecordId, record_type: impl Into<String>) -> Self {
        Self {
            id,
            record_type: record_type.into(),
            fields: BTreeMap::new(),
            change_tag: None,
            modified_at: None,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.fields.insert(name.into(), bytes);
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Vec<u8>> {
        self.fields.remove(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Server change tag; `None` until the record has been saved once.
    pub fn change_tag(&self) -> Option<&str> {
        self.change_tag.as_deref()
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    /// Called by remote store implementations when a save is accepted.
    pub fn mark_saved(&mut self, change_tag: impl Into<String>, at: DateTime<Utc>) {
        self.change_tag = Some(change_tag.into());
        self.modified_at = Some(at);
    }
}
