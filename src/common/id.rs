//! Kademlia key space Id
use rand::Rng;
use sha1_smol::Sha1;
use std::fmt::{self, Debug, Formatter};

/// The size of Kademlia Ids in bytes.
pub const ID_SIZE: usize = 20;
pub const MAX_DISTANCE: u8 = ID_SIZE as u8 * 8;

#[derive(Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash)]
/// Position of a peer or a lookup key in the 160 bit Kademlia key space.
///
/// Peer ids and DHT keys are arbitrary byte strings, so both are mapped
/// into the key space by hashing them with [Id::for_key].
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes)
    }

    /// Map an arbitrary key (or peer id bytes) into the key space.
    pub fn for_key(key: &[u8]) -> Id {
        let mut hasher = Sha1::new();
        hasher.update(key);

        Id(hasher.digest().bytes())
    }

    /// Simplified XOR distance between this Id and a target Id.
    ///
    /// The distance is the number of trailing non zero bits in the XOR result.
    ///
    /// Distance to self is 0
    /// Distance to the furthest Id is 160
    /// Distance to an Id with 5 leading matching bits is 155
    pub fn distance(&self, other: &Id) -> u8 {
        for i in 0..ID_SIZE {
            let a = self.0[i];
            let b = other.0[i];

            if a != b {
                // leading zeros so far + leading zeros of this byte
                let leading_zeros = (i as u32 * 8 + (a ^ b).leading_zeros()) as u8;

                return MAX_DISTANCE - leading_zeros;
            }
        }

        0
    }

    /// Full XOR metric, comparable lexicographically.
    pub fn xor(&self, other: &Id) -> [u8; ID_SIZE] {
        let mut result = [0; ID_SIZE];

        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        result
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:x?})", &self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn distance_to_self() {
        let id = Id::random();
        assert_eq!(id.distance(&id), 0);
        assert_eq!(id.xor(&id), [0; ID_SIZE]);
    }

    #[test]
    fn distance_to_furthest() {
        let id = Id([0; ID_SIZE]);
        let furthest = Id([255; ID_SIZE]);

        assert_eq!(id.distance(&furthest), MAX_DISTANCE);
    }

    #[test]
    fn distance_with_leading_matches() {
        let a = Id([0; ID_SIZE]);
        let mut bytes = [0; ID_SIZE];
        bytes[0] = 0b0000_0100;
        let b = Id(bytes);

        assert_eq!(a.distance(&b), 155);
    }

    #[test]
    fn for_key_is_deterministic() {
        assert_eq!(Id::for_key(b"hello"), Id::for_key(b"hello"));
        assert_ne!(Id::for_key(b"hello"), Id::for_key(b"hellp"));
    }
}
