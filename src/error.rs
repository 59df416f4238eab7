//! Error types for stowage.
//!
//! None of these reach a consumer of a [`Synchronizer`](crate::Synchronizer):
//! the synchronizer logs them and falls back to its default value. They are
//! returned by the lower-level store and codec APIs.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for stowage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by a [`KeyValueStore`](crate::storage::KeyValueStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store is disabled or cannot be reached
    #[error("key-value store is unavailable")]
    Unavailable,

    /// A write would exceed the store's capacity
    #[error("storage quota exceeded: {needed} bytes needed, quota is {quota}")]
    QuotaExceeded {
        /// Bytes the store would hold after the write
        needed: usize,
        /// Configured capacity in bytes
        quota: usize,
    },

    /// Backing file could not be read or written
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// Backing file does not hold a JSON object of strings
    #[error("storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Failures raised while converting between encoded and decoded values.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Value could not be turned into its string form
    #[error("failed to encode value: {0}")]
    Encode(String),

    /// Stored string could not be turned into a value
    #[error("failed to decode '{0}'")]
    Decode(String),

    /// JSON encoding or decoding failed
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The main error type for stowage.
#[derive(Error, Debug)]
pub enum Error {
    /// Store operation failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Codec failed for a specific key
    #[error("codec error for key '{key}': {source}")]
    Codec {
        /// Key whose value failed to convert
        key: String,
        /// Underlying codec failure
        #[source]
        source: CodecError,
    },

    /// Configuration could not be parsed
    #[error("invalid configuration: {0}")]
    Config(#[source] serde_json::Error),
}

impl Error {
    /// Wrap a codec failure with the key it happened on.
    pub fn codec(key: impl Into<String>, source: CodecError) -> Self {
        Self::Codec {
            key: key.into(),
            source,
        }
    }

    /// Whether this error means the store could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Store(StoreError::Unavailable))
    }
}
