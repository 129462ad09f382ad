//! Record Codec
//!
//! A [`Record`] is one stored entry: the opaque value plus its timestamps.
//! The durable backend persists it as a small JSON document:
//!
//! ```text
//! {
//!   "version": 1,
//!   "value": "...",
//!   "created_at": "2026-10-19T12:00:00Z",
//!   "expires_at": "2026-10-19T15:00:00Z",
//!   "last_accessed_at": null
//! }
//! ```
//!
//! The volatile backend keeps the same struct in memory without encoding it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Current on-disk format version.
pub const RECORD_VERSION: u32 = 1;

/// Record codec failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Bytes are not a well-formed record. Readers treat this as "absent".
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The record could not be serialized.
    #[error("failed to encode record: {0}")]
    Encode(String),
}

/// A stored entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The caller's payload, never inspected
    pub value: String,
    /// When the current value was written
    pub created_at: DateTime<Utc>,
    /// After this instant the entry is logically absent
    pub expires_at: DateTime<Utc>,
    /// Last renewing read, if any
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Wire shape with the version tag alongside the record fields.
#[derive(Serialize, Deserialize)]
struct Envelope<R> {
    version: u32,
    #[serde(flatten)]
    record: R,
}

impl Record {
    /// Creates a fresh record written at `now` that lives for `ttl`.
    pub fn new(value: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: expiry_from(now, ttl),
            last_accessed_at: None,
        }
    }

    /// Checks if this record has expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Slides the expiry window forward so it ends `ttl` after `now`.
    pub fn renew(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.expires_at = expiry_from(now, ttl);
        self.last_accessed_at = Some(now);
    }

    /// Remaining lifetime at `now`, or zero if already expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Serializes the record into its persisted byte form.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let envelope = Envelope {
            version: RECORD_VERSION,
            record: self,
        };
        serde_json::to_vec_pretty(&envelope).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Parses a persisted record.
    ///
    /// Any malformed, truncated or inconsistent input yields
    /// [`CodecError::Corrupt`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let envelope: Envelope<Record> =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Corrupt(e.to_string()))?;

        if envelope.version != RECORD_VERSION {
            return Err(CodecError::Corrupt(format!(
                "unsupported record version {}",
                envelope.version
            )));
        }

        let record = envelope.record;
        if record.expires_at <= record.created_at {
            return Err(CodecError::Corrupt(
                "expires_at is not after created_at".to_string(),
            ));
        }

        Ok(record)
    }
}

/// Longest single expiry window. Keeps `expires_at` within four-digit years,
/// which is all RFC 3339 timestamps can round-trip.
pub const MAX_TTL: Duration = Duration::from_secs(1000 * 365 * 24 * 3600);

/// `now + ttl`, with `ttl` capped at [`MAX_TTL`].
fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl.min(MAX_TTL))
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record::new(
            r#"{"turns":[{"role":"user","content":"hi"}]}"#.to_string(),
            Utc::now(),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_encode_decode() {
        let record = sample();
        let decoded = Record::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_encoding_is_tagged() {
        let json: serde_json::Value = serde_json::from_slice(&sample().encode().unwrap()).unwrap();
        assert_eq!(json["version"], RECORD_VERSION);
        assert!(json["last_accessed_at"].is_null());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            Record::decode(b"invalid json {{{"),
            Err(CodecError::Corrupt(_))
        ));
        assert!(matches!(Record::decode(b""), Err(CodecError::Corrupt(_))));
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = sample().encode().unwrap();
        for cut in [1, bytes.len() / 2, bytes.len() - 1] {
            assert!(Record::decode(&bytes[..cut]).is_err(), "cut at {}", cut);
        }
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut json: serde_json::Value = serde_json::from_slice(&sample().encode().unwrap()).unwrap();
        json["version"] = serde_json::json!(99);
        let bytes = serde_json::to_vec(&json).unwrap();
        assert!(Record::decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_inverted_timestamps() {
        let mut record = sample();
        record.expires_at = record.created_at;
        assert!(Record::decode(&record.encode().unwrap()).is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let record = Record::new("v".into(), now, Duration::from_secs(2));
        assert!(!record.is_expired_at(now + chrono::Duration::milliseconds(1999)));
        assert!(record.is_expired_at(now + chrono::Duration::seconds(2)));
    }

    #[test]
    fn test_renew_slides_from_now() {
        let now = Utc::now();
        let mut record = Record::new("v".into(), now, Duration::from_secs(10));
        let later = now + chrono::Duration::seconds(8);
        record.renew(later, Duration::from_secs(10));

        assert_eq!(record.expires_at, later + chrono::Duration::seconds(10));
        assert_eq!(record.last_accessed_at, Some(later));
        assert_eq!(record.created_at, now);
        assert_eq!(record.remaining(later), Duration::from_secs(10));
    }

    #[test]
    fn test_huge_ttl_still_decodes() {
        let record = Record::new("v".into(), Utc::now(), Duration::from_secs(u64::MAX));
        let decoded = Record::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert!(!decoded.is_expired_at(Utc::now()));
    }
}
