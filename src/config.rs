use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::codec::ValueCodec;
use crate::coalescer::CoalescerConfig;
use crate::core::{KvError, Result};

/// Field holding the value in a per-key record.
pub const VALUE_FIELD: &str = "value";

/// How keys map onto remote records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordLayout {
    /// One record per key, named after the key.
    PerKey { record_type: String },
    /// One record holding every key as a field.
    SingleRecord {
        record_name: String,
        record_type: String,
    },
}

impl RecordLayout {
    pub fn per_key() -> Self {
        Self::PerKey {
            record_type: "Value".to_string(),
        }
    }

    pub fn single_record() -> Self {
        Self::SingleRecord {
            record_name: "values".to_string(),
            record_type: "Values".to_string(),
        }
    }

    pub fn record_type(&self) -> &str {
        match self {
            Self::PerKey { record_type } | Self::SingleRecord { record_type, .. } => record_type,
        }
    }
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self::per_key()
    }
}

/// Whether reads see writes that have not reached the remote store yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadConsistency {
    /// Reads consult pending and in-flight writes before the remote store.
    #[default]
    ReadYourWrites,
    /// Reads always go to the remote store and may miss unflushed writes.
    Eventual,
}

/// Key-value store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub layout: RecordLayout,

    /// Quiet period before pending writes are flushed
    pub debounce_ms: u64,

    /// Flush no later than this after the first unflushed write
    pub max_deferral_ms: Option<u64>,

    /// Limit on each blocking fetch; `None` waits forever
    pub fetch_timeout_ms: Option<u64>,

    pub consistency: ReadConsistency,

    /// Encoding for newly written values
    pub codec: ValueCodec,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            layout: RecordLayout::default(),
            debounce_ms: 1_000,
            max_deferral_ms: None,
            fetch_timeout_ms: Some(30_000),
            consistency: ReadConsistency::default(),
            codec: ValueCodec::default(),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KvError::Config(format!("invalid store config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the record layout
    pub fn layout(mut self, layout: RecordLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the debounce quiet period
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    /// Set the maximum deferral
    pub fn max_deferral(mut self, max_deferral: Duration) -> Self {
        self.max_deferral_ms = Some(max_deferral.as_millis() as u64);
        self
    }

    /// Set the fetch timeout
    pub fn fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// Set read consistency
    pub fn consistency(mut self, consistency: ReadConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Set the codec for new writes
    pub fn codec(mut self, codec: ValueCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(KvError::Config("debounce_ms must be greater than zero".to_string()));
        }
        if self.max_deferral_ms == Some(0) {
            return Err(KvError::Config(
                "max_deferral_ms must be greater than zero when set".to_string(),
            ));
        }
        if self.fetch_timeout_ms == Some(0) {
            return Err(KvError::Config(
                "fetch_timeout_ms must be greater than zero when set".to_string(),
            ));
        }
        match &self.layout {
            RecordLayout::PerKey { record_type } if record_type.trim().is_empty() => Err(
                KvError::Config("record_type must not be empty".to_string()),
            ),
            RecordLayout::SingleRecord {
                record_name,
                record_type,
            } if record_name.trim().is_empty() || record_type.trim().is_empty() => Err(
                KvError::Config("record_name and record_type must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }

    pub fn coalescer_config(&self) -> CoalescerConfig {
        CoalescerConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            max_deferral: self.max_deferral_ms.map(Duration::from_millis),
        }
    }

    pub fn fetch_timeout_duration(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = StoreConfig::new()
            .layout(RecordLayout::single_record())
            .debounce(Duration::from_millis(250))
            .max_deferral(Duration::from_secs(5))
            .fetch_timeout(None)
            .consistency(ReadConsistency::Eventual)
            .codec(ValueCodec::Json);

        assert_eq!(config.layout.record_type(), "Values");
        assert_eq!(config.coalescer_config().debounce, Duration::from_millis(250));
        assert_eq!(config.coalescer_config().max_deferral, Some(Duration::from_secs(5)));
        assert_eq!(config.fetch_timeout_duration(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = StoreConfig::from_json(r#"{ "debounce_ms": 200, "codec": "Json" }"#).unwrap();
        assert_eq!(config.debounce_ms, 200);
        assert_eq!(config.codec, ValueCodec::Json);
        assert_eq!(config.layout, RecordLayout::per_key());
        assert_eq!(config.fetch_timeout_ms, Some(30_000));

        let single = StoreConfig::from_json(
            r#"{ "layout": { "SingleRecord": { "record_name": "prefs", "record_type": "Prefs" } } }"#,
        )
        .unwrap();
        assert_eq!(single.layout.record_type(), "Prefs");
    }

    #[test]
    fn test_validation_errors() {
        assert!(StoreConfig::from_json(r#"{ "debounce_ms": 0 }"#).is_err());
        assert!(StoreConfig::from_json("not json").is_err());
        let blank = StoreConfig::new().layout(RecordLayout::PerKey {
            record_type: " ".to_string(),
        });
        assert!(matches!(blank.validate(), Err(KvError::Config(_))));
    }
}
