//! JSON codec for gateway frames.
//!
//! Inbound frames are decoded into an [`Envelope`] once they have been
//! decompressed; outbound [`Command`]s are encoded to bytes before they reach
//! the transport.

use thiserror::Error;

use crate::protocol::{Command, Envelope};

/// Errors raised while encoding or decoding gateway frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An outbound command could not be serialized.
    #[error("failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),
    /// An inbound frame was not a valid envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode `command` as JSON bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode(command: &Command) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(command).map_err(CodecError::Encode)
}

/// Decode one decompressed frame into an [`Envelope`].
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if `bytes` is not a JSON envelope.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}
