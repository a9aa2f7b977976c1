//! Serialize and deserialize DHT messages.

mod internal;

use std::convert::TryInto;
use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use tracing::debug;

use crate::common::{Connectedness, PeerId, PeerRecord, Record};
use crate::peerstore::Connectivity;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Message types of the DHT protocol.
///
/// Requests and their responses share the same type.
pub enum MessageType {
    PutValue,
    GetValue,
    AddProvider,
    GetProviders,
    FindNode,
    Ping,
    /// A type this node doesn't know how to handle, with its wire value.
    Unsupported(i32),
}

impl MessageType {
    pub fn to_i32(self) -> i32 {
        match self {
            MessageType::PutValue => 0,
            MessageType::GetValue => 1,
            MessageType::AddProvider => 2,
            MessageType::GetProviders => 3,
            MessageType::FindNode => 4,
            MessageType::Ping => 5,
            MessageType::Unsupported(value) => value,
        }
    }

    pub fn from_i32(value: i32) -> MessageType {
        match value {
            0 => MessageType::PutValue,
            1 => MessageType::GetValue,
            2 => MessageType::AddProvider,
            3 => MessageType::GetProviders,
            4 => MessageType::FindNode,
            5 => MessageType::Ping,
            other => MessageType::Unsupported(other),
        }
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::PutValue => write!(f, "PUT_VALUE"),
            MessageType::GetValue => write!(f, "GET_VALUE"),
            MessageType::AddProvider => write!(f, "ADD_PROVIDER"),
            MessageType::GetProviders => write!(f, "GET_PROVIDERS"),
            MessageType::FindNode => write!(f, "FIND_NODE"),
            MessageType::Ping => write!(f, "PING"),
            MessageType::Unsupported(value) => write!(f, "UNSUPPORTED({})", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Request and response envelope.
pub struct Message {
    pub message_type: MessageType,
    /// Content id, peer id or an arbitrary namespaced key, depending on the type.
    pub key: Bytes,
    pub record: Option<Record>,
    pub closer_peers: Vec<WirePeer>,
    pub provider_peers: Vec<WirePeer>,
    /// Echoed from request to response.
    pub cluster_level: i32,
}

#[derive(Debug, Clone, PartialEq)]
/// Peer descriptor as carried in messages.
pub struct WirePeer {
    pub id: PeerId,
    pub addresses: Vec<SocketAddr>,
    /// Connection state between the sender and this peer.
    pub connection: Connectedness,
}

impl Message {
    /// Create an empty envelope, the starting point of every response.
    pub fn new<K: Into<Bytes>>(message_type: MessageType, key: K, cluster_level: i32) -> Self {
        Self {
            message_type,
            key: key.into(),
            record: None,
            closer_peers: vec![],
            provider_peers: vec![],
            cluster_level,
        }
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_provider_peers(mut self, provider_peers: Vec<WirePeer>) -> Self {
        self.provider_peers = provider_peers;
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.clone().into_wire_message().to_bytes()
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Message> {
        Message::from_wire_message(internal::WireMessage::from_bytes(bytes.as_ref())?)
    }

    fn into_wire_message(self) -> internal::WireMessage {
        internal::WireMessage {
            message_type: self.message_type.to_i32(),
            key: self.key.to_vec(),
            record: self.record,
            closer_peers: self
                .closer_peers
                .iter()
                .map(WirePeer::to_wire_dict)
                .collect(),
            provider_peers: self
                .provider_peers
                .iter()
                .map(WirePeer::to_wire_dict)
                .collect(),
            cluster_level: self.cluster_level,
        }
    }

    fn from_wire_message(msg: internal::WireMessage) -> Result<Message> {
        Ok(Message {
            message_type: MessageType::from_i32(msg.message_type),
            key: msg.key.into(),
            record: msg.record,
            closer_peers: msg
                .closer_peers
                .into_iter()
                .map(WirePeer::from_wire_dict)
                .collect(),
            provider_peers: msg
                .provider_peers
                .into_iter()
                .map(WirePeer::from_wire_dict)
                .collect(),
            cluster_level: msg.cluster_level,
        })
    }
}

impl WirePeer {
    /// Describe a peer record, annotated with our connection state to it.
    pub fn from_record(record: PeerRecord, connectivity: &dyn Connectivity) -> WirePeer {
        WirePeer {
            connection: connectivity.connectedness(&record.id),
            id: record.id,
            addresses: record.addresses,
        }
    }

    pub fn to_record(&self) -> PeerRecord {
        PeerRecord::new(self.id.clone(), self.addresses.clone())
    }

    fn to_wire_dict(&self) -> internal::WirePeerDict {
        internal::WirePeerDict {
            id: self.id.as_bytes().to_vec(),
            addresses: self
                .addresses
                .iter()
                .map(|address| serde_bytes::ByteBuf::from(sockaddr_to_bytes(address)))
                .collect(),
            connection: self.connection.to_i32(),
        }
    }

    /// Undecodable addresses are skipped, so a peer may end up with none.
    fn from_wire_dict(dict: internal::WirePeerDict) -> WirePeer {
        let id = PeerId::from_bytes(dict.id);

        let addresses = dict
            .addresses
            .iter()
            .filter_map(|bytes| match bytes_to_sockaddr(bytes) {
                Ok(address) => Some(address),
                Err(error) => {
                    debug!(peer = ?id, ?error, "Skipping undecodable peer address");
                    None
                }
            })
            .collect();

        WirePeer {
            id,
            addresses,
            connection: Connectedness::from_i32(dict.connection),
        }
    }
}

/// Describe peer records for a response.
pub fn records_to_wire(
    records: Vec<PeerRecord>,
    connectivity: &dyn Connectivity,
) -> Vec<WirePeer> {
    records
        .into_iter()
        .map(|record| WirePeer::from_record(record, connectivity))
        .collect()
}

fn bytes_to_sockaddr<T: AsRef<[u8]>>(bytes: T) -> Result<SocketAddr> {
    let bytes = bytes.as_ref();
    match bytes.len() {
        6 => {
            let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);

            let port_bytes_as_array: [u8; 2] = bytes[4..6]
                .try_into()
                .map_err(|_| Error::InvalidAddress("wrong number of bytes for port"))?;

            let port: u16 = u16::from_be_bytes(port_bytes_as_array);

            Ok(SocketAddr::new(IpAddr::V4(ip), port))
        }

        18 => {
            let octets: [u8; 16] = bytes[..16]
                .try_into()
                .map_err(|_| Error::InvalidAddress("wrong number of bytes for ipv6"))?;
            let port_bytes_as_array: [u8; 2] = bytes[16..18]
                .try_into()
                .map_err(|_| Error::InvalidAddress("wrong number of bytes for port"))?;

            Ok(SocketAddr::new(
                IpAddr::V6(Ipv6Addr::from(octets)),
                u16::from_be_bytes(port_bytes_as_array),
            ))
        }

        _ => Err(Error::InvalidAddress("wrong number of bytes for sockaddr")),
    }
}

pub fn sockaddr_to_bytes(sockaddr: &SocketAddr) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(18);

    match sockaddr {
        SocketAddr::V4(v4) => bytes.extend(v4.ip().octets()),
        SocketAddr::V6(v6) => bytes.extend(v6.ip().octets()),
    }

    bytes.extend(sockaddr.port().to_be_bytes());

    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peerstore::MemoryPeerstore;

    fn peer(last_octet: u8, connection: Connectedness) -> WirePeer {
        WirePeer {
            id: PeerId::random(),
            addresses: vec![SocketAddr::from(([10, 0, 0, last_octet], 4001))],
            connection,
        }
    }

    #[test]
    fn message_type_values() {
        assert_eq!(MessageType::from_i32(0), MessageType::PutValue);
        assert_eq!(MessageType::from_i32(1), MessageType::GetValue);
        assert_eq!(MessageType::from_i32(2), MessageType::AddProvider);
        assert_eq!(MessageType::from_i32(3), MessageType::GetProviders);
        assert_eq!(MessageType::from_i32(4), MessageType::FindNode);
        assert_eq!(MessageType::from_i32(5), MessageType::Ping);
        assert_eq!(MessageType::from_i32(9), MessageType::Unsupported(9));
        assert_eq!(MessageType::Unsupported(9).to_i32(), 9);
    }

    #[test]
    fn test_put_value_message() {
        let mut record = Record::new(&b"/v/key"[..], &b"value"[..]);
        record.time_received = Some("2024-01-01T00:00:00Z".to_string());

        let original = Message::new(MessageType::PutValue, &b"/v/key"[..], 3).with_record(record);

        let bytes = original.to_bytes().unwrap();
        let parsed = Message::from_bytes(bytes).unwrap();

        assert_eq!(parsed, original);
    }

    #[test]
    fn test_get_providers_response() {
        let mut original = Message::new(MessageType::GetProviders, &b"\x01\x55"[..], 0);
        original.closer_peers = vec![
            peer(1, Connectedness::Connected),
            peer(2, Connectedness::NotConnected),
        ];
        original.provider_peers = vec![WirePeer {
            id: PeerId::random(),
            addresses: vec![
                SocketAddr::from(([127, 0, 0, 1], 6881)),
                "[::1]:4001".parse().unwrap(),
            ],
            connection: Connectedness::CanConnect,
        }];

        let parsed = Message::from_bytes(original.to_bytes().unwrap()).unwrap();

        assert_eq!(parsed, original);
    }

    #[test]
    fn test_unknown_type_survives_decoding() {
        let original = Message::new(MessageType::Unsupported(42), &b"k"[..], -1);

        let parsed = Message::from_bytes(original.to_bytes().unwrap()).unwrap();

        assert_eq!(parsed.message_type, MessageType::Unsupported(42));
        assert_eq!(parsed.cluster_level, -1);
    }

    #[test]
    fn test_malformed_address_is_skipped() {
        let original = Message::new(MessageType::AddProvider, Bytes::new(), 0);
        let mut wire = original.into_wire_message();
        wire.provider_peers.push(internal::WirePeerDict {
            id: b"peer".to_vec(),
            addresses: vec![
                serde_bytes::ByteBuf::from(vec![1, 2, 3]),
                serde_bytes::ByteBuf::from(vec![10, 0, 0, 1, 0x0f, 0xa1]),
            ],
            connection: 0,
        });
        wire.provider_peers.push(internal::WirePeerDict {
            id: b"other".to_vec(),
            addresses: vec![serde_bytes::ByteBuf::from(vec![9; 7])],
            connection: 0,
        });

        let parsed = Message::from_bytes(wire.to_bytes().unwrap()).unwrap();

        assert_eq!(parsed.provider_peers.len(), 2);
        assert_eq!(
            parsed.provider_peers[0].addresses,
            vec![SocketAddr::from(([10, 0, 0, 1], 4001))]
        );
        assert!(parsed.provider_peers[1].addresses.is_empty());
    }

    #[test]
    fn test_malformed_sockaddr() {
        assert!(matches!(
            bytes_to_sockaddr([1u8, 2, 3]),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_garbage() {
        assert!(matches!(
            Message::from_bytes(b"i42e"),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn test_from_record_uses_connectivity() {
        let peerstore = MemoryPeerstore::new();
        let id = PeerId::random();
        peerstore.set_connectedness(&id, Connectedness::Connected);

        let record = PeerRecord::new(id.clone(), vec![SocketAddr::from(([1, 2, 3, 4], 5))]);
        let wire = WirePeer::from_record(record.clone(), &peerstore);

        assert_eq!(wire.connection, Connectedness::Connected);
        assert_eq!(wire.to_record(), record);
    }

    #[test]
    fn test_sockaddr_bytes() {
        let v4 = SocketAddr::from(([192, 168, 1, 2], 258));
        assert_eq!(sockaddr_to_bytes(&v4), vec![192, 168, 1, 2, 1, 2]);
        assert_eq!(bytes_to_sockaddr(sockaddr_to_bytes(&v4)).unwrap(), v4);

        let v6: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        assert_eq!(bytes_to_sockaddr(sockaddr_to_bytes(&v6)).unwrap(), v6);
    }
}
