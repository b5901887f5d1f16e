//! Record key encoding.

use std::fmt;

use serde_json::Value as JsonValue;

use crate::error::Error;

/// Tag byte for integer ids.
const INT_TAG: u8 = 0x01;

/// Tag byte for string ids.
const STRING_TAG: u8 = 0x02;

/// An encoded record identifier.
///
/// Key format: `[tag (1 byte)][payload]`. Integer payloads are 8 bytes
/// big-endian with the sign bit flipped, so lexicographic ordering matches
/// numeric ordering and range scans return records in id order. String
/// payloads are raw UTF-8 and sort after every integer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(Vec<u8>);

impl RecordKey {
    /// Encode a JSON id. Only integers and strings are valid ids.
    pub fn from_id(id: &JsonValue) -> Result<Self, Error> {
        match id {
            JsonValue::Number(n) => {
                let i = n
                    .as_i64()
                    .ok_or_else(|| Error::InvalidRequest(format!("id {} is not an integer", n)))?;
                let mut buf = Vec::with_capacity(9);
                buf.push(INT_TAG);
                buf.extend_from_slice(&((i as u64) ^ (1 << 63)).to_be_bytes());
                Ok(Self(buf))
            }
            JsonValue::String(s) => {
                let mut buf = Vec::with_capacity(1 + s.len());
                buf.push(STRING_TAG);
                buf.extend_from_slice(s.as_bytes());
                Ok(Self(buf))
            }
            other => Err(Error::InvalidRequest(format!(
                "id must be an integer or a string, got {}",
                other
            ))),
        }
    }

    /// Decode a key back into its JSON id.
    pub fn decode(bytes: &[u8]) -> Result<JsonValue, Error> {
        match bytes.split_first() {
            Some((&INT_TAG, payload)) if payload.len() == 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(payload);
                Ok(JsonValue::from((u64::from_be_bytes(buf) ^ (1 << 63)) as i64))
            }
            Some((&STRING_TAG, payload)) => std::str::from_utf8(payload)
                .map(|s| JsonValue::String(s.to_string()))
                .map_err(|_| Error::InvalidKey),
            _ => Err(Error::InvalidKey),
        }
    }

    /// The encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for RecordKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordKey").field(&hex::encode(&self.0)).finish()
    }
}

/// Render an id for messages (`42`, `FR`).
pub fn display_id(id: &JsonValue) -> String {
    match id {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Get current timestamp in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_decode_roundtrip() {
        for id in [json!(0), json!(-7), json!(i64::MAX), json!("FR")] {
            let key = RecordKey::from_id(&id).unwrap();
            assert_eq!(RecordKey::decode(key.as_bytes()).unwrap(), id);
        }
    }

    #[test]
    fn test_lexicographic_ordering() {
        let keys: Vec<_> = [json!(-100), json!(-1), json!(0), json!(2), json!(300), json!("a")]
            .iter()
            .map(|id| RecordKey::from_id(id).unwrap())
            .collect();

        for pair in keys.windows(2) {
            assert!(pair[0].as_bytes() < pair[1].as_bytes());
        }
    }

    #[test]
    fn test_invalid_ids() {
        assert!(RecordKey::from_id(&json!(null)).is_err());
        assert!(RecordKey::from_id(&json!(1.5)).is_err());
        assert!(RecordKey::from_id(&json!({"id": 1})).is_err());
        assert!(matches!(RecordKey::decode(&[9, 9]), Err(Error::InvalidKey)));
    }

    #[test]
    fn test_debug_is_hex() {
        let key = RecordKey::from_id(&json!("A")).unwrap();
        assert_eq!(format!("{:?}", key), "RecordKey(\"0241\")");
    }
}
