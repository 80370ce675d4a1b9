//! Lifecycle states of a shard.

use std::fmt;

/// Where a shard is in its connection lifecycle.
///
/// A connection moves `Disconnected → Connecting → AwaitingHello →
/// (Identifying | Resuming) → Steady` and back to `Disconnected`, passing
/// through `Closing` when closed locally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShardState {
    #[default]
    Disconnected,
    /// Opening the transport, including retries.
    Connecting,
    /// Transport open; waiting for the gateway's Hello.
    AwaitingHello,
    /// Sending Identify for a new session.
    Identifying,
    /// Sending Resume for an existing session.
    Resuming,
    /// Handshake complete; frames are being routed.
    Steady,
    /// A local close is in progress.
    Closing,
}

impl ShardState {
    /// Whether a transport exists or is being opened.
    #[must_use]
    pub fn is_active(self) -> bool { !matches!(self, Self::Disconnected) }

    fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Steady => "steady",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
