//! Helper functions for immutable values.

use sha1_smol::Sha1;

use super::{split_key, ValidationError, Validator};
use crate::common::ID_SIZE;

pub const IMMUTABLE_NAMESPACE: &str = "imm";

#[derive(Debug, Clone, Copy, Default)]
/// Values stored under `/imm/<hash of the value>`.
///
/// Such a value can never change, so any valid candidate is as good as another.
pub struct ImmutableValidator;

/// The key an immutable value is stored under.
pub fn immutable_key(v: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(IMMUTABLE_NAMESPACE.len() + 2 + ID_SIZE);
    key.push(b'/');
    key.extend_from_slice(IMMUTABLE_NAMESPACE.as_bytes());
    key.push(b'/');
    key.extend_from_slice(&hash_immutable(v));

    key
}

pub fn hash_immutable(v: &[u8]) -> [u8; ID_SIZE] {
    let mut encoded = Vec::with_capacity(v.len() + 3);
    encoded.extend(format!("{}:", v.len()).bytes());
    encoded.extend_from_slice(v);

    let mut hasher = Sha1::new();
    hasher.update(&encoded);

    hasher.digest().bytes()
}

impl Validator for ImmutableValidator {
    fn validate(&self, key: &[u8], value: &[u8]) -> Result<(), ValidationError> {
        let (_, hash) = split_key(key)?;

        if hash != &hash_immutable(value)[..] {
            return Err(ValidationError::HashMismatch);
        }

        Ok(())
    }

    fn select(&self, _key: &[u8], values: &[&[u8]]) -> Result<usize, ValidationError> {
        if values.is_empty() {
            return Err(ValidationError::NoValidValues);
        }

        Ok(0)
    }
}
