//! Record type for stored values.

use crate::error::Error;
use rkyv::{Archive, Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A stored record with metadata.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Record {
    /// The entity document as JSON bytes.
    pub data: Vec<u8>,

    /// Creation timestamp in microseconds since Unix epoch.
    pub created_at: u64,

    /// Last write timestamp in microseconds since Unix epoch.
    pub updated_at: u64,

    /// Write counter, starting at 1.
    pub version: u64,
}

impl Record {
    /// Create a first-version record with the current timestamp.
    pub fn new(data: Vec<u8>) -> Self {
        let now = super::key::current_timestamp();
        Self {
            data,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Create the next version of this record.
    pub fn next(&self, data: Vec<u8>) -> Self {
        Self {
            data,
            created_at: self.created_at,
            updated_at: super::key::current_timestamp(),
            version: self.version + 1,
        }
    }

    /// Build a record from a JSON document.
    pub fn from_document(document: &JsonValue) -> Result<Self, Error> {
        Ok(Self::new(encode_document(document)?))
    }

    /// Decode the stored JSON document.
    pub fn document(&self) -> Result<JsonValue, Error> {
        serde_json::from_slice(&self.data).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Serialize the record to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Encode a JSON document for storage.
pub fn encode_document(document: &JsonValue) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(document).map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_roundtrip() {
        let record = Record::from_document(&json!({"id": 1, "code": "FR"})).unwrap();
        let bytes = record.to_bytes().unwrap();
        let decoded = Record::from_bytes(&bytes).unwrap();

        assert_eq!(record, decoded);
        assert_eq!(decoded.document().unwrap()["code"], "FR");
    }

    #[test]
    fn test_next_version() {
        let first = Record::new(b"{}".to_vec());
        let second = first.next(b"{\"a\":1}".to_vec());

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }
}
