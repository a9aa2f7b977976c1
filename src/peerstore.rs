//! Peer address book and connectivity oracle.

use std::collections::HashMap;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::common::{Connectedness, PeerId, PeerRecord};

/// Known addresses of peers.
pub trait AddressBook: Send + Sync + Debug {
    /// One record per requested id, in the same order. Unknown peers get a
    /// record without addresses.
    fn peer_records(&self, peers: &[PeerId]) -> Vec<PeerRecord>;

    /// Remember `addresses` for `peer` for at least `ttl`.
    fn add_addresses(&self, peer: &PeerId, addresses: &[SocketAddr], ttl: Duration);
}

/// Connection state of this node to other peers.
pub trait Connectivity: Send + Sync + Debug {
    fn connectedness(&self, peer: &PeerId) -> Connectedness;
}

#[derive(Debug, Default)]
/// In memory [AddressBook] and [Connectivity].
pub struct MemoryPeerstore {
    addresses: RwLock<HashMap<PeerId, Vec<(SocketAddr, Instant)>>>,
    connectedness: RwLock<HashMap<PeerId, Connectedness>>,
}

impl MemoryPeerstore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the connection state reported for `peer`.
    pub fn set_connectedness(&self, peer: &PeerId, connectedness: Connectedness) {
        self.connectedness
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer.clone(), connectedness);
    }

    /// Unexpired addresses of `peer`.
    pub fn addresses(&self, peer: &PeerId) -> Vec<SocketAddr> {
        let now = Instant::now();

        self.addresses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, expires)| *expires > now)
                    .map(|(address, _)| *address)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl AddressBook for MemoryPeerstore {
    fn peer_records(&self, peers: &[PeerId]) -> Vec<PeerRecord> {
        peers
            .iter()
            .map(|peer| PeerRecord::new(peer.clone(), self.addresses(peer)))
            .collect()
    }

    fn add_addresses(&self, peer: &PeerId, addresses: &[SocketAddr], ttl: Duration) {
        let now = Instant::now();
        let expires = now + ttl;

        let mut book = self
            .addresses
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entries = book.entry(peer.clone()).or_default();

        entries.retain(|(_, expiry)| *expiry > now);

        for address in addresses {
            match entries.iter_mut().find(|(known, _)| known == address) {
                // Never shorten the life of an address we already know.
                Some((_, expiry)) => *expiry = (*expiry).max(expires),
                None => entries.push((*address, expires)),
            }
        }
    }
}

impl Connectivity for MemoryPeerstore {
    fn connectedness(&self, peer: &PeerId) -> Connectedness {
        self.connectedness
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn records_keep_request_order() {
        let store = MemoryPeerstore::new();
        let a = PeerId::random();
        let b = PeerId::random();
        let address = SocketAddr::from(([10, 0, 0, 1], 4001));

        store.add_addresses(&b, &[address], MINUTE);

        let records = store.peer_records(&[a.clone(), b.clone()]);

        assert_eq!(
            records,
            vec![PeerRecord::new(a, vec![]), PeerRecord::new(b, vec![address])]
        );
    }

    #[test]
    fn addresses_are_merged() {
        let store = MemoryPeerstore::new();
        let peer = PeerId::random();
        let first = SocketAddr::from(([10, 0, 0, 1], 4001));
        let second = SocketAddr::from(([10, 0, 0, 2], 4001));

        store.add_addresses(&peer, &[first], MINUTE);
        store.add_addresses(&peer, &[first, second], MINUTE);

        assert_eq!(store.addresses(&peer), vec![first, second]);
    }

    #[test]
    fn expired_addresses_are_hidden() {
        let store = MemoryPeerstore::new();
        let peer = PeerId::random();

        store.add_addresses(&peer, &[SocketAddr::from(([10, 0, 0, 1], 1))], Duration::ZERO);

        assert!(store.addresses(&peer).is_empty());
    }

    #[test]
    fn shorter_ttl_does_not_expire_known_address() {
        let store = MemoryPeerstore::new();
        let peer = PeerId::random();
        let address = SocketAddr::from(([10, 0, 0, 1], 1));

        store.add_addresses(&peer, &[address], MINUTE);
        store.add_addresses(&peer, &[address], Duration::ZERO);

        assert_eq!(store.addresses(&peer), vec![address]);
    }

    #[test]
    fn connectedness_defaults_to_not_connected() {
        let store = MemoryPeerstore::new();
        let peer = PeerId::random();

        assert_eq!(store.connectedness(&peer), Connectedness::NotConnected);

        store.set_connectedness(&peer, Connectedness::CanConnect);
        assert_eq!(store.connectedness(&peer), Connectedness::CanConnect);
    }
}
