//! Peer identifiers and the address records the handlers hand out.
use std::fmt::{self, Debug, Display, Formatter};
use std::net::SocketAddr;

use bytes::Bytes;
use rand::Rng;

use crate::common::Id;

/// Multihash code of sha2-256, the usual digest behind peer ids.
const SHA2_256: u8 = 0x12;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Opaque peer identifier.
///
/// Peer ids travel as raw bytes (usually a multihash of the peer's public key),
/// and a FIND_NODE key is interpreted directly as one.
pub struct PeerId(Bytes);

impl PeerId {
    /// Wrap raw id bytes.
    pub fn from_bytes<T: Into<Bytes>>(bytes: T) -> PeerId {
        PeerId(bytes.into())
    }

    /// A random sha2-256 multihash shaped id.
    pub fn random() -> PeerId {
        let mut rng = rand::thread_rng();
        let digest: [u8; 32] = rng.gen();

        let mut bytes = Vec::with_capacity(34);
        bytes.push(SHA2_256);
        bytes.push(32);
        bytes.extend_from_slice(&digest);

        PeerId(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// Position of this peer in the Kademlia key space.
    pub fn kademlia_id(&self) -> Id {
        Id::for_key(&self.0)
    }
}

impl Debug for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Skip the multihash prefix, it is the same for most peers.
        let shown = if self.0.len() > 2 { &self.0[2..] } else { &self.0[..] };

        for byte in shown.iter().take(8) {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A peer and the addresses it is known to be reachable at.
pub struct PeerRecord {
    pub id: PeerId,
    pub addresses: Vec<SocketAddr>,
}

impl PeerRecord {
    pub fn new(id: PeerId, addresses: Vec<SocketAddr>) -> PeerRecord {
        PeerRecord { id, addresses }
    }

    /// Returns `true` if the record carries no address, which makes it useless to a requester.
    pub fn has_no_addresses(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Connection state between this node and a peer.
pub enum Connectedness {
    /// No connection, no extra information.
    #[default]
    NotConnected,
    /// A live connection is open.
    Connected,
    /// Recently connected, or known to be dialable.
    CanConnect,
    /// Recently failed to connect.
    CannotConnect,
}

impl Connectedness {
    pub fn to_i32(self) -> i32 {
        match self {
            Connectedness::NotConnected => 0,
            Connectedness::Connected => 1,
            Connectedness::CanConnect => 2,
            Connectedness::CannotConnect => 3,
        }
    }

    /// Unknown values fall back to [Connectedness::NotConnected].
    pub fn from_i32(value: i32) -> Connectedness {
        match value {
            1 => Connectedness::Connected,
            2 => Connectedness::CanConnect,
            3 => Connectedness::CannotConnect,
            _ => Connectedness::NotConnected,
        }
    }

    /// Connected or connectable.
    pub fn is_reachable(self) -> bool {
        matches!(self, Connectedness::Connected | Connectedness::CanConnect)
    }
}
