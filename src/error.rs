//! Canonical error types for the crate.
//!
//! [`ShardError`] is the single error surface of the connection state
//! machine. Transport, codec, decompression and dispatch failures each have
//! their own enum so callers can match on the layer that failed.

use thiserror::Error;

pub use crate::{codec::CodecError, dispatch::DispatchError, inflate::DecompressionError};
use crate::transport::TransportError;

/// Errors raised by [`crate::Shard`] operations.
#[derive(Debug, Error)]
pub enum ShardError {
    /// `connect` was called while a transport already exists.
    #[error("shard is already connected")]
    AlreadyConnected,
    /// A command was sent without a live transport.
    #[error("shard is not connected")]
    NotConnected,
    /// The gateway closed the session with a code that cannot be recovered.
    #[error("close code {code} received; the session cannot be recovered")]
    UnrecoverableSession {
        /// Close code reported by the gateway.
        code: u16,
    },
    /// [`crate::Shard::close`] was called before the handshake finished.
    #[error("shard was closed while connecting")]
    Closed,
    /// The gateway did not send Hello within the configured timeout.
    #[error("timed out waiting for hello")]
    HelloTimeout,
    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A command could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ShardError {
    /// Returns true if this error was caused by a reset connection.
    #[must_use]
    pub fn is_connection_reset(&self) -> bool {
        matches!(self, Self::Transport(TransportError::ConnectionReset))
    }
}

/// Errors returned when building a [`crate::Shard`] or one of its parts.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The rate limiter was configured with zero capacity.
    #[error("rate limit capacity must be at least 1")]
    InvalidCapacity,
    /// The rate limiter was configured with a zero-length window.
    #[error("rate limit window must be non-zero")]
    InvalidWindow,
    /// The shard index does not fit within the shard count.
    #[error("shard index {index} is out of range for shard count {count}")]
    InvalidShard {
        /// Configured shard index.
        index: u32,
        /// Configured shard count.
        count: u32,
    },
    /// The token was empty.
    #[error("a gateway token is required")]
    MissingToken,
    /// The proxy URL could not be parsed or is not an `http` URL.
    #[error("invalid proxy url: {url}")]
    InvalidProxy {
        /// The rejected URL.
        url: String,
    },
}

/// Result alias for shard operations.
pub type Result<T> = std::result::Result<T, ShardError>;
