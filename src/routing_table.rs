//! Simplified Kademlia routing table

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::slice::Iter;
use std::sync::{PoisonError, RwLock};

use crate::common::{Id, PeerId, ID_SIZE};

/// K = the default maximum size of a k-bucket.
const MAX_BUCKET_SIZE_K: usize = 20;

/// Source of the peers closest to a key.
pub trait RoutingTable: Send + Sync + Debug {
    /// Up to `count` known peers closest to `target`, nearest first, never
    /// including `exclude`.
    fn closer_peers(&self, target: &[u8], exclude: &PeerId, count: usize) -> Vec<PeerId>;
}

#[derive(Debug)]
/// K-bucket table over the XOR distance between [PeerId::kademlia_id]s.
pub struct KademliaTable {
    id: PeerId,
    kademlia_id: Id,
    buckets: RwLock<BTreeMap<u8, KBucket>>,
}

impl KademliaTable {
    /// An empty table centered on the local peer `id`.
    pub fn new(id: PeerId) -> Self {
        KademliaTable {
            kademlia_id: id.kademlia_id(),
            id,
            buckets: RwLock::new(BTreeMap::new()),
        }
    }

    // === Public Methods ===

    /// Returns `false` if the peer is this node, is already known or its bucket is full.
    pub fn add(&self, peer: PeerId) -> bool {
        if peer == self.id {
            return false;
        }

        let distance = self.kademlia_id.distance(&peer.kademlia_id());

        self.buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(distance)
            .or_insert_with(KBucket::new)
            .add(peer)
    }

    pub fn remove(&self, peer: &PeerId) {
        let distance = self.kademlia_id.distance(&peer.kademlia_id());

        if let Some(bucket) = self
            .buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&distance)
        {
            bucket.remove(peer)
        }
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        let distance = self.kademlia_id.distance(&peer.kademlia_id());

        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&distance)
            .map(|bucket| bucket.contains(peer))
            .unwrap_or(false)
    }

    /// Number of peers in the table.
    pub fn size(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(KBucket::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl RoutingTable for KademliaTable {
    fn closer_peers(&self, target: &[u8], exclude: &PeerId, count: usize) -> Vec<PeerId> {
        let target = Id::for_key(target);
        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);

        let mut peers: Vec<([u8; ID_SIZE], &PeerId)> = buckets
            .values()
            .flat_map(KBucket::iter)
            .filter(|peer| *peer != exclude)
            .map(|peer| (peer.kademlia_id().xor(&target), peer))
            .collect();

        peers.sort();
        peers.truncate(count);

        peers.into_iter().map(|(_, peer)| peer.clone()).collect()
    }
}

/// Peers at the same distance from this node.
///
/// Insertion order is kept, a full bucket rejects new peers.
struct KBucket {
    peers: Vec<PeerId>,
}

impl KBucket {
    fn new() -> Self {
        KBucket {
            peers: Vec::with_capacity(MAX_BUCKET_SIZE_K),
        }
    }

    fn add(&mut self, peer: PeerId) -> bool {
        if self.contains(&peer) {
            return false;
        }

        if self.peers.len() < MAX_BUCKET_SIZE_K {
            self.peers.push(peer);
            true
        } else {
            false
        }
    }

    fn remove(&mut self, peer: &PeerId) {
        self.peers.retain(|known| known != peer);
    }

    fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    fn len(&self) -> usize {
        self.peers.len()
    }

    fn iter(&self) -> Iter<'_, PeerId> {
        self.peers.iter()
    }
}

impl Debug for KBucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bucket{{")?;
        for peer in &self.peers {
            writeln!(f, "  {:?}", peer)?;
        }
        write!(f, "}}")
    }
}
