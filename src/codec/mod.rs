//! Field encoding for stored values.
//!
//! Every field is `[FORMAT_VERSION][format tag][payload]`. The tag names the
//! payload format, so decoding never depends on how the store is configured.

use serde::{Deserialize, Serialize};
use crate::core::{KvError, Result, Value};

pub const FORMAT_VERSION: u8 = 1;

const TAG_MESSAGE_PACK: u8 = b'M';
const TAG_JSON: u8 = b'J';
const HEADER_LEN: usize = 2;

/// Payload format used when writing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValueCodec {
    /// Compact binary encoding via `rmp-serde`.
    #[default]
    MessagePack,
    /// Human-readable encoding via `serde_json`. Rejects NaN and infinities.
    Json,
}

impl ValueCodec {
    fn tag(self) -> u8 {
        match self {
            Self::MessagePack => TAG_MESSAGE_PACK,
            Self::Json => TAG_JSON,
        }
    }

    pub fn encode(self, value: &Value) -> Result<Vec<u8>> {
        let payload = match self {
            Self::MessagePack => rmp_serde::to_vec_named(value)
                .map_err(|e| KvError::Encode(format!("messagepack: {}", e)))?,
            Self::Json => {
                if value.contains_non_finite() {
                    return Err(KvError::Encode(
                        "json cannot represent NaN or infinite doubles".to_string(),
                    ));
                }
                serde_json::to_vec(value).map_err(|e| KvError::Encode(format!("json: {}", e)))?
            }
        };

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.push(FORMAT_VERSION);
        bytes.push(self.tag());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decodes a field written by any codec.
    pub fn decode(bytes: &[u8]) -> Result<Value> {
        let (codec, payload) = Self::split_header(bytes)?;
        match codec {
            Self::MessagePack => rmp_serde::from_slice(payload)
                .map_err(|e| KvError::Decode(format!("messagepack: {}", e))),
            Self::Json => serde_json::from_slice(payload)
                .map_err(|e| KvError::Decode(format!("json: {}", e))),
        }
    }

    /// Reports which codec wrote `bytes` without decoding the payload.
    pub fn detect(bytes: &[u8]) -> Result<Self> {
        Self::split_header(bytes).map(|(codec, _)| codec)
    }

    fn split_header(bytes: &[u8]) -> Result<(Self, &[u8])> {
        if bytes.len() < HEADER_LEN {
            return Err(KvError::Decode(format!(
                "field too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != FORMAT_VERSION {
            return Err(KvError::Decode(format!(
                "unsupported format version {}",
                bytes[0]
            )));
        }
        let codec = match bytes[1] {
            TAG_MESSAGE_PACK => Self::MessagePack,
            TAG_JSON => Self::Json,
            other => {
                return Err(KvError::Decode(format!("unknown format tag 0x{:02x}", other)));
            }
        };
        Ok((codec, &bytes[HEADER_LEN..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn nested() -> Value {
        let mut map = BTreeMap::new();
        map.insert("flag".to_string(), Value::Bool(true));
        map.insert("blob".to_string(), Value::Data(vec![0, 255, 7]));
        map.insert(
            "list".to_string(),
            Value::Array(vec![Value::Integer(-4), Value::Double(0.25), Value::from("s")]),
        );
        Value::Dictionary(map)
    }

    #[test]
    fn test_decode_dispatches_on_tag() {
        let value = nested();
        let packed = ValueCodec::MessagePack.encode(&value).unwrap();
        let json = ValueCodec::Json.encode(&value).unwrap();

        assert_eq!(ValueCodec::detect(&packed).unwrap(), ValueCodec::MessagePack);
        assert_eq!(ValueCodec::detect(&json).unwrap(), ValueCodec::Json);
        assert_eq!(ValueCodec::decode(&packed).unwrap(), value);
        assert_eq!(ValueCodec::decode(&json).unwrap(), value);
    }

    #[test]
    fn test_integer_and_double_stay_distinct() {
        for codec in [ValueCodec::MessagePack, ValueCodec::Json] {
            let int = codec.encode(&Value::Integer(2)).unwrap();
            let dbl = codec.encode(&Value::Double(2.0)).unwrap();
            assert_eq!(ValueCodec::decode(&int).unwrap(), Value::Integer(2));
            assert_eq!(ValueCodec::decode(&dbl).unwrap(), Value::Double(2.0));
        }
    }

    #[test]
    fn test_malformed_headers() {
        assert!(matches!(ValueCodec::decode(&[]), Err(KvError::Decode(_))));
        assert!(matches!(ValueCodec::decode(&[9, b'M', 0xc3]), Err(KvError::Decode(_))));
        assert!(matches!(ValueCodec::decode(&[FORMAT_VERSION, b'X']), Err(KvError::Decode(_))));
        assert!(matches!(
            ValueCodec::decode(&[FORMAT_VERSION, b'J', b'{']),
            Err(KvError::Decode(_))
        ));
    }

    #[test]
    fn test_json_rejects_non_finite() {
        let err = ValueCodec::Json.encode(&Value::Double(f64::NAN)).unwrap_err();
        assert!(matches!(err, KvError::Encode(_)));
        let packed = ValueCodec::MessagePack.encode(&Value::Double(f64::NAN)).unwrap();
        assert_eq!(ValueCodec::decode(&packed).unwrap(), Value::Double(f64::NAN));
    }
}
