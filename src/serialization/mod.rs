//! Encoding of cached return values.
//!
//! Backends store opaque bytes; a [`Serializer`] turns the memoized callable's
//! return value into those bytes and back.

use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Trait for serializing and deserializing cache values.
pub trait Serializer: Send + Sync + Debug {
    /// Serialize a value into bytes.
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize bytes into a value.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Bincode serializer implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl BincodeSerializer {
    /// Create a new BincodeSerializer.
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for BincodeSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| crate::error::Error::Codec(format!("{}", e)))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| crate::error::Error::Codec(format!("{}", e)))
    }
}

/// JSON serializer implementation. Slower than bincode, but entries stay
/// readable in backend inspection tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Create a new JsonSerializer.
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value)
            .map_err(|e| crate::error::Error::Codec(format!("JSON serialization error: {}", e)))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes)
            .map_err(|e| crate::error::Error::Codec(format!("JSON deserialization error: {}", e)))
    }
}
