use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::RwLock;
use crate::core::{KvError, Result, Value};
use crate::interface::KeyValueStore;

/// A [`KeyValueStore`] held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(KvError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn value(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    async fn set_value(&self, key: &str, value: Option<Value>) -> Result<()> {
        check_key(key)?;
        let mut values = self.values.write().await;
        match value {
            Some(value) => {
                values.insert(key.to_string(), value);
            }
            None => {
                values.remove(key);
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        check_key(key)?;
        self.values.write().await.remove(key);
        Ok(())
    }
}
