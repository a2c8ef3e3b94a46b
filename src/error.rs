//! Error types for the callcache library.

use std::fmt;

/// The main error type for the callcache library.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The qualified name of a callable could not be determined.
    #[error("cannot resolve callable identity: {0}")]
    IdentityResolution(String),

    /// A call argument has no deterministic rendering for the cache key.
    #[error("argument cannot be rendered into a cache key: {0}")]
    UnserializableArgument(String),

    /// The arguments do not match the shape the callable identity expects.
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An error that occurred during serialization or deserialization.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The backend returned an error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The requested feature is not implemented.
    #[error("Feature not implemented: {0}")]
    NotImplemented(String),
}

impl Error {
    /// Creates a new backend error.
    pub fn backend<E: fmt::Display>(error: E) -> Self {
        Self::Backend(error.to_string())
    }

    /// Returns `true` for errors raised by the storage layer.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::NotImplemented(_))
    }
}

/// A specialized `Result` type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
