//! Pluggable record validation and conflict resolution.

mod immutable;
mod mutable;

use std::collections::HashMap;
use std::fmt::Debug;

pub use immutable::*;
pub use mutable::*;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Reasons a validator rejects a record.
pub enum ValidationError {
    #[error("invalid record key")]
    InvalidKey,

    #[error("no validator for namespace {0:?}")]
    UnknownNamespace(String),

    #[error("value doesn't match the hash in its key")]
    HashMismatch,

    #[error("invalid mutable value encoding")]
    InvalidEncoding,

    #[error("mutable value public key doesn't match its key")]
    TargetMismatch,

    #[error("invalid mutable value public key")]
    InvalidPublicKey,

    #[error("invalid mutable value signature")]
    InvalidSignature,

    #[error("no valid values to select from")]
    NoValidValues,

    #[error("{0}")]
    Rejected(String),
}

/// Validates record values and picks the best of several values for a key.
pub trait Validator: Send + Sync + Debug {
    /// Returns an error if `value` may not be stored under `key`.
    fn validate(&self, key: &[u8], value: &[u8]) -> Result<(), ValidationError>;

    /// Returns the index of the preferred value.
    ///
    /// Ties resolve to the lowest index.
    fn select(&self, key: &[u8], values: &[&[u8]]) -> Result<usize, ValidationError>;
}

/// Split a `/<namespace>/<rest>` key.
pub fn split_key(key: &[u8]) -> Result<(&str, &[u8]), ValidationError> {
    let key = key.strip_prefix(b"/").ok_or(ValidationError::InvalidKey)?;

    let separator = key
        .iter()
        .position(|byte| *byte == b'/')
        .ok_or(ValidationError::InvalidKey)?;

    let (namespace, rest) = (&key[..separator], &key[separator + 1..]);

    if namespace.is_empty() || rest.is_empty() {
        return Err(ValidationError::InvalidKey);
    }

    let namespace = std::str::from_utf8(namespace).map_err(|_| ValidationError::InvalidKey)?;

    Ok((namespace, rest))
}

#[derive(Debug)]
/// Dispatches to a validator by the namespace of the record key.
pub struct NamespacedValidator {
    validators: HashMap<String, Box<dyn Validator>>,
}

impl NamespacedValidator {
    /// A validator without any namespace, rejecting everything.
    pub fn empty() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    /// Register `validator` for keys under `/<namespace>/`.
    pub fn with<V: Validator + 'static>(mut self, namespace: &str, validator: V) -> Self {
        self.validators
            .insert(namespace.to_string(), Box::new(validator));
        self
    }

    fn validator_for(&self, key: &[u8]) -> Result<&dyn Validator, ValidationError> {
        let (namespace, _) = split_key(key)?;

        self.validators
            .get(namespace)
            .map(|validator| validator.as_ref())
            .ok_or_else(|| ValidationError::UnknownNamespace(namespace.to_string()))
    }
}

impl Default for NamespacedValidator {
    /// Registers [ImmutableValidator] under `imm` and [MutableValidator] under `mut`.
    fn default() -> Self {
        Self::empty()
            .with(IMMUTABLE_NAMESPACE, ImmutableValidator)
            .with(MUTABLE_NAMESPACE, MutableValidator)
    }
}

impl Validator for NamespacedValidator {
    fn validate(&self, key: &[u8], value: &[u8]) -> Result<(), ValidationError> {
        self.validator_for(key)?.validate(key, value)
    }

    fn select(&self, key: &[u8], values: &[&[u8]]) -> Result<usize, ValidationError> {
        self.validator_for(key)?.select(key, values)
    }
}
