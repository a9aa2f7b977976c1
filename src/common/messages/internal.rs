use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::common::Record;
use crate::Result;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireMessage {
    #[serde(rename = "t")]
    pub message_type: i32,

    #[serde(rename = "k", with = "serde_bytes")]
    pub key: Vec<u8>,

    #[serde(default)]
    #[serde(rename = "r", skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,

    #[serde(default)]
    #[serde(rename = "c")]
    pub closer_peers: Vec<WirePeerDict>,

    #[serde(default)]
    #[serde(rename = "p")]
    pub provider_peers: Vec<WirePeerDict>,

    #[serde(default)]
    #[serde(rename = "l")]
    pub cluster_level: i32,
}

impl WireMessage {
    pub fn from_bytes(bytes: &[u8]) -> Result<WireMessage> {
        Ok(serde_bencode::from_bytes(bytes)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_bencode::to_bytes(self)?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WirePeerDict {
    #[serde(rename = "i", with = "serde_bytes")]
    pub id: Vec<u8>,

    #[serde(default)]
    #[serde(rename = "a")]
    // Compact addresses: ip octets followed by a big endian port.
    pub addresses: Vec<ByteBuf>,

    #[serde(default)]
    #[serde(rename = "c")]
    pub connection: i32,
}
