//! Stored records, their codec and the freshness policy applied on read.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
/// A value stored under a DHT key.
pub struct Record {
    /// Must match the key of the PUT_VALUE message carrying it.
    #[serde(rename = "k")]
    pub key: Bytes,
    /// Opaque value, interpreted by the [crate::validator::Validator].
    #[serde(rename = "v")]
    pub value: Bytes,
    /// RFC 3339 time at which this node stored the record.
    ///
    /// Only ever set by the storing node, never trusted from the wire.
    #[serde(rename = "tr", default, skip_serializing_if = "Option::is_none")]
    pub time_received: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of the freshness check done when serving a stored record.
pub enum Freshness {
    Fresh,
    /// Older than the maximum record age.
    Expired,
    /// No receipt time, or one that doesn't parse.
    MissingReceiptTime,
}

impl Freshness {
    pub fn is_fresh(self) -> bool {
        self == Freshness::Fresh
    }
}

impl Record {
    pub fn new<K: Into<Bytes>, V: Into<Bytes>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            time_received: None,
        }
    }

    /// Decode a record previously written by [Record::to_bytes].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Record> {
        Ok(serde_bencode::from_bytes(bytes.as_ref())?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_bencode::to_bytes(self)?)
    }

    /// Drop any receipt time a peer may have sent along.
    pub fn clean(&mut self) {
        self.time_received = None;
    }

    /// Record `now` as the time this node received the record.
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.time_received = Some(now.to_rfc3339_opts(SecondsFormat::Nanos, true));
    }

    /// Parsed receipt time.
    pub fn received_at(&self) -> Result<DateTime<Utc>> {
        let raw = self
            .time_received
            .as_deref()
            .ok_or_else(|| Error::InvalidRecordTime("missing".to_string()))?;

        DateTime::parse_from_rfc3339(raw)
            .map(|time| time.with_timezone(&Utc))
            .map_err(|error| Error::InvalidRecordTime(error.to_string()))
    }

    /// Check the record against the maximum age at time `now`.
    pub fn freshness(&self, max_age: Duration, now: DateTime<Utc>) -> Freshness {
        let received = match self.received_at() {
            Ok(received) => received,
            Err(_) => return Freshness::MissingReceiptTime,
        };

        match (now - received).to_std() {
            Ok(age) if age > max_age => Freshness::Expired,
            // A negative age means a receipt time in the future, the clock moved back.
            _ => Freshness::Fresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    #[test]
    fn codec() {
        let mut record = Record::new(&b"/v/hello"[..], &b"world"[..]);
        record.stamp(Utc::now());

        let decoded = Record::from_bytes(record.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded, record);
    }

    #[test]
    fn unstamped_record_has_no_receipt_field() {
        let record = Record::new(&b"k"[..], &b"v"[..]);

        assert_eq!(record.to_bytes().unwrap(), b"d1:k1:k1:v1:ve".to_vec());
    }

    #[test]
    fn corrupt_bytes() {
        assert!(Record::from_bytes(b"not bencode").is_err());
    }

    #[test]
    fn fresh_and_expired() {
        let now = Utc::now();
        let mut record = Record::new(&b"k"[..], &b"v"[..]);

        record.stamp(now - chrono::Duration::hours(1));
        assert_eq!(record.freshness(2 * HOUR, now), Freshness::Fresh);

        record.stamp(now - chrono::Duration::hours(3));
        assert_eq!(record.freshness(2 * HOUR, now), Freshness::Expired);

        record.stamp(now + chrono::Duration::hours(3));
        assert_eq!(record.freshness(2 * HOUR, now), Freshness::Fresh);
    }

    #[test]
    fn missing_or_garbled_receipt_time() {
        let now = Utc::now();
        let mut record = Record::new(&b"k"[..], &b"v"[..]);

        assert_eq!(record.freshness(HOUR, now), Freshness::MissingReceiptTime);

        record.time_received = Some("yesterday-ish".to_string());
        assert_eq!(record.freshness(HOUR, now), Freshness::MissingReceiptTime);
    }

    #[test]
    fn clean_strips_receipt_time() {
        let mut record = Record::new(&b"k"[..], &b"v"[..]);
        record.stamp(Utc::now());

        record.clean();

        assert_eq!(record.time_received, None);
    }
}
