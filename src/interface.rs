use std::collections::BTreeMap;
use async_trait::async_trait;
use crate::core::{Result, Value};

/// A generic key-value store contract.
///
/// Implementors provide untyped access; the typed getters and setters are
/// derived from it. Typed getters return the type's default when the key is
/// absent or holds a different variant: `false` for booleans, zero for
/// numbers and `None` for everything else. Passing `None` to a nullable
/// setter removes the key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// The value stored under `key`, if any.
    async fn value(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`; `None` removes the key.
    async fn set_value(&self, key: &str, value: Option<Value>) -> Result<()>;

    /// Remove `key`. Removing an absent key is a no-op.
    async fn remove(&self, key: &str) -> Result<()>;

    async fn has(&self, key: &str) -> bool {
        self.value(key).await.is_some()
    }

    async fn string(&self, key: &str) -> Option<String> {
        self.value(key).await.and_then(|v| v.try_into().ok())
    }

    async fn boolean(&self, key: &str) -> bool {
        self.value(key)
            .await
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    async fn integer(&self, key: &str) -> i64 {
        self.value(key).await.and_then(|v| v.as_i64()).unwrap_or(0)
    }

    async fn double(&self, key: &str) -> f64 {
        self.value(key).await.and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    async fn array(&self, key: &str) -> Option<Vec<Value>> {
        self.value(key).await.and_then(|v| v.try_into().ok())
    }

    async fn dictionary(&self, key: &str) -> Option<BTreeMap<String, Value>> {
        self.value(key).await.and_then(|v| v.try_into().ok())
    }

    async fn data(&self, key: &str) -> Option<Vec<u8>> {
        self.value(key).await.and_then(|v| v.try_into().ok())
    }

    async fn set_string(&self, key: &str, value: Option<&str>) -> Result<()> {
        self.set_value(key, value.map(Value::from)).await
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_value(key, Some(Value::Bool(value))).await
    }

    async fn set_integer(&self, key: &str, value: i64) -> Result<()> {
        self.set_value(key, Some(Value::Integer(value))).await
    }

    async fn set_double(&self, key: &str, value: f64) -> Result<()> {
        self.set_value(key, Some(Value::Double(value))).await
    }

    async fn set_array(&self, key: &str, value: Option<Vec<Value>>) -> Result<()> {
        self.set_value(key, value.map(Value::Array)).await
    }

    async fn set_dictionary(
        &self,
        key: &str,
        value: Option<BTreeMap<String, Value>>,
    ) -> Result<()> {
        self.set_value(key, value.map(Value::Dictionary)).await
    }

    async fn set_data(&self, key: &str, value: Option<Vec<u8>>) -> Result<()> {
        self.set_value(key, value.map(Value::Data)).await
    }
}
