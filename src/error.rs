//! Main Crate Error

use crate::common::CidError;
use crate::datastore::DatastoreError;
use crate::validator::ValidationError;

#[derive(thiserror::Error, Debug)]
/// Kadserve crate error enum.
pub enum Error {
    /// GET_VALUE without a key.
    #[error("handle get value: no key was provided")]
    EmptyKey,

    /// PUT_VALUE without a record.
    #[error("nil record")]
    MissingRecord,

    /// PUT_VALUE whose record key differs from the message key.
    #[error("put key doesn't match record key")]
    KeyMismatch,

    /// The validator rejected a record.
    #[error(transparent)]
    InvalidRecord(#[from] ValidationError),

    /// The record already stored is preferred over the one being put.
    #[error("old record")]
    OldRecord,

    /// Key of a provider message is not a content identifier.
    #[error(transparent)]
    InvalidContentId(#[from] CidError),

    /// Datastore failure other than a soft absence.
    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    #[error("Failed to parse bencoded bytes: {0}")]
    /// Record or message (de)serialization failure.
    Codec(#[from] serde_bencode::Error),

    /// A record receipt time could not be formatted or parsed.
    #[error("invalid record receipt time: {0}")]
    InvalidRecordTime(String),

    /// The request context was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// The request context deadline passed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// No handler exists for this message type.
    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(i32),

    /// Compact address bytes of a wire peer are malformed.
    #[error("invalid peer address: {0}")]
    InvalidAddress(&'static str),

    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    /// The [crate::Node] workers are gone.
    #[error("node was shutdown")]
    NodeShutdown,
}

/// Alias for `Result<T, kadserve::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
