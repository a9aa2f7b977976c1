//! Key-value persistence contract used by the value store and provider handlers.

use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;

use crate::common::{decode_base32, encode_base32};
use crate::Context;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DatastoreError {
    /// Soft absence, callers decide whether it matters.
    #[error("datastore: key not found")]
    NotFound,

    #[error("datastore: {0}")]
    Backend(String),
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Datastore key derived from a DHT key.
///
/// DHT keys may contain any byte, so they are stored as `/` followed by their
/// unpadded base32 encoding.
pub struct DatastoreKey(String);

impl DatastoreKey {
    pub fn from_dht_key(key: &[u8]) -> Self {
        DatastoreKey(format!("/{}", encode_base32(key)))
    }

    /// Recover the DHT key this datastore key was derived from.
    pub fn to_dht_key(&self) -> Option<Vec<u8>> {
        decode_base32(self.0.strip_prefix('/')?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for DatastoreKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "DatastoreKey({})", self.0)
    }
}

impl Display for DatastoreKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistent key-value store.
///
/// Implementations must make completed writes visible to subsequent reads.
pub trait Datastore: Send + Sync + Debug {
    /// Returns [DatastoreError::NotFound] if nothing is stored under `key`.
    fn get(&self, ctx: &Context, key: &DatastoreKey) -> Result<Bytes, DatastoreError>;

    fn put(&self, ctx: &Context, key: &DatastoreKey, value: Bytes) -> Result<(), DatastoreError>;

    fn delete(&self, ctx: &Context, key: &DatastoreKey) -> Result<(), DatastoreError>;

    fn has(&self, ctx: &Context, key: &DatastoreKey) -> Result<bool, DatastoreError>;
}

#[derive(Debug, Default)]
/// In memory [Datastore].
pub struct MemoryDatastore {
    entries: RwLock<HashMap<DatastoreKey, Bytes>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Datastore for MemoryDatastore {
    fn get(&self, _ctx: &Context, key: &DatastoreKey) -> Result<Bytes, DatastoreError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or(DatastoreError::NotFound)
    }

    fn put(&self, _ctx: &Context, key: &DatastoreKey, value: Bytes) -> Result<(), DatastoreError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), value);

        Ok(())
    }

    fn delete(&self, _ctx: &Context, key: &DatastoreKey) -> Result<(), DatastoreError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);

        Ok(())
    }

    fn has(&self, _ctx: &Context, key: &DatastoreKey) -> Result<bool, DatastoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_encoding() {
        let key = DatastoreKey::from_dht_key(b"foobar");

        assert_eq!(key.as_str(), "/MZXW6YTBOI");
        assert_eq!(key.to_dht_key(), Some(b"foobar".to_vec()));
    }

    #[test]
    fn unprintable_keys_are_distinct() {
        let a = DatastoreKey::from_dht_key(&[0, 1, 2]);
        let b = DatastoreKey::from_dht_key(&[0, 1, 3]);

        assert_ne!(a, b);
        assert!(a.as_str().bytes().all(|c| c.is_ascii_graphic()));
    }

    #[test]
    fn memory_datastore() {
        let ctx = Context::new();
        let store = MemoryDatastore::new();
        let key = DatastoreKey::from_dht_key(b"key");

        assert_eq!(store.get(&ctx, &key), Err(DatastoreError::NotFound));
        assert_eq!(store.has(&ctx, &key), Ok(false));

        store.put(&ctx, &key, Bytes::from_static(b"value")).unwrap();

        assert_eq!(store.get(&ctx, &key), Ok(Bytes::from_static(b"value")));
        assert_eq!(store.has(&ctx, &key), Ok(true));
        assert_eq!(store.len(), 1);

        store.delete(&ctx, &key).unwrap();

        assert!(store.is_empty());
        assert_eq!(store.delete(&ctx, &key), Ok(()));
    }
}
