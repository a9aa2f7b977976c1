//! Signed, sequence numbered values.

use std::convert::TryFrom;

use bytes::Bytes;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha1_smol::Sha1;

use super::{split_key, ValidationError, Validator};
use crate::common::ID_SIZE;

pub const MUTABLE_NAMESPACE: &str = "mut";

#[derive(Debug, Clone, Copy, Default)]
/// Values stored under `/mut/<hash of public key and optional salt>`.
///
/// The value must be an encoded [MutableValue] signed by that public key,
/// and the value with the highest sequence number wins.
pub struct MutableValidator;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// A value signed by an ed25519 key, versioned by a sequence number.
pub struct MutableValue {
    /// ed25519 public key
    #[serde(rename = "k", with = "serde_bytes")]
    key: [u8; 32],
    /// sequence number
    seq: i64,
    /// mutable value
    #[serde(rename = "v")]
    value: Bytes,
    /// ed25519 signature
    #[serde(rename = "sig", with = "serde_bytes")]
    signature: [u8; 64],
    /// Optional salt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<Bytes>,
}

impl MutableValue {
    /// Create a new mutable value from a signing key, value, sequence number and optional salt.
    pub fn new(signer: &SigningKey, value: &[u8], seq: i64, salt: Option<&[u8]>) -> Self {
        let signable = encode_signable(seq, value, salt);
        let signature = signer.sign(&signable);

        Self {
            key: signer.verifying_key().to_bytes(),
            seq,
            value: Bytes::copy_from_slice(value),
            signature: signature.to_bytes(),
            salt: salt.map(Bytes::copy_from_slice),
        }
    }

    /// The DHT key of values signed by `public_key` with an optional `salt`.
    pub fn key_for(public_key: &[u8; 32], salt: Option<&[u8]>) -> Vec<u8> {
        let mut key = Vec::with_capacity(MUTABLE_NAMESPACE.len() + 2 + ID_SIZE);
        key.push(b'/');
        key.extend_from_slice(MUTABLE_NAMESPACE.as_bytes());
        key.push(b'/');
        key.extend_from_slice(&target_from_key(public_key, salt));

        key
    }

    /// The DHT key this value belongs under.
    pub fn dht_key(&self) -> Vec<u8> {
        MutableValue::key_for(&self.key, self.salt())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        serde_bencode::from_bytes(bytes).map_err(|_| ValidationError::InvalidEncoding)
    }

    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_bencode::to_bytes(self)?)
    }

    /// Check the signature over the sequence number, value and salt.
    pub fn verify(&self) -> Result<(), ValidationError> {
        let key = VerifyingKey::try_from(&self.key[..])
            .map_err(|_| ValidationError::InvalidPublicKey)?;

        let signature = Signature::from_bytes(&self.signature);

        key.verify(
            &encode_signable(self.seq, &self.value, self.salt()),
            &signature,
        )
        .map_err(|_| ValidationError::InvalidSignature)
    }

    // === Getters ===

    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn seq(&self) -> i64 {
        self.seq
    }

    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }

    pub fn salt(&self) -> Option<&[u8]> {
        self.salt.as_deref()
    }
}

/// Hash of a public key and optional salt.
pub fn target_from_key(public_key: &[u8; 32], salt: Option<&[u8]>) -> [u8; ID_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(public_key);

    if let Some(salt) = salt {
        hasher.update(salt);
    }

    hasher.digest().bytes()
}

pub fn encode_signable(seq: i64, value: &[u8], salt: Option<&[u8]>) -> Box<[u8]> {
    let mut signable = vec![];

    if let Some(salt) = salt {
        signable.extend(format!("4:salt{}:", salt.len()).into_bytes());
        signable.extend(salt);
    }

    signable.extend(format!("3:seqi{}e1:v{}:", seq, value.len()).into_bytes());
    signable.extend(value);

    signable.into()
}

fn decode_and_verify(key: &[u8], value: &[u8]) -> Result<MutableValue, ValidationError> {
    let (_, target) = split_key(key)?;
    let item = MutableValue::from_bytes(value)?;

    if target != &target_from_key(&item.key, item.salt())[..] {
        return Err(ValidationError::TargetMismatch);
    }

    item.verify()?;

    Ok(item)
}

impl Validator for MutableValidator {
    fn validate(&self, key: &[u8], value: &[u8]) -> Result<(), ValidationError> {
        decode_and_verify(key, value).map(|_| ())
    }

    fn select(&self, key: &[u8], values: &[&[u8]]) -> Result<usize, ValidationError> {
        let mut best: Option<(usize, i64)> = None;

        for (index, value) in values.iter().enumerate() {
            // Invalid candidates are skipped rather than failing the selection.
            let seq = match decode_and_verify(key, value) {
                Ok(item) => item.seq(),
                Err(_) => continue,
            };

            match best {
                Some((_, best_seq)) if best_seq >= seq => {}
                _ => best = Some((index, seq)),
            }
        }

        best.map(|(index, _)| index)
            .ok_or(ValidationError::NoValidValues)
    }
}
