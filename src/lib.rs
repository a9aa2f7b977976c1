#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

mod common;
mod error;
mod node;

#[cfg(feature = "async")]
pub mod async_node;
pub mod context;
pub mod datastore;
pub mod peerstore;
pub mod providers;
pub mod routing_table;
pub mod server;
pub mod validator;

pub use crate::common::{
    decode_base32, encode_base32, CidError, Connectedness, ContentId, Freshness, Id, Message,
    MessageType, PeerId, PeerRecord, Record, WirePeer, DAG_PB, ID_SIZE, RAW, SHA2_256,
};
pub use bytes::Bytes;
pub use context::Context;
pub use error::{Error, Result};
pub use node::{Node, NodeSettings, PendingResponse, DEFAULT_WORKERS};
pub use server::{Server, ServerBuilder, ServerSettings};

pub use ed25519_dalek::SigningKey;
