#![doc(html_root_url = "https://docs.rs/shardwire/latest")]
//! Public API for the `shardwire` library.
//!
//! This crate provides a client for a sharded, zlib-compressed WebSocket
//! gateway: a [`Shard`] keeps one session alive with heartbeats, resumes it
//! after transient failures, rate-limits outbound commands and fans inbound
//! events out to handlers registered on a [`Dispatcher`].

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod inflate;
pub mod metrics;
pub mod protocol;
pub mod ratelimit;
pub mod session;
pub mod shard;
pub mod test_helpers;
pub mod transport;

pub use dispatch::{DispatchError, Dispatcher, EventPayload, Handler, HandlerError};
pub use error::{ConfigError, Result, ShardError};
pub use protocol::{Command, Envelope, OpCode};
pub use ratelimit::RateLimiter;
pub use session::{SessionState, ShardInfo};
pub use shard::{
    CloseCodePolicy,
    ReconnectBackoff,
    Shard,
    ShardBuilder,
    ShardConfig,
    ShardState,
    TracingConfig,
};
pub use transport::{Connector, ProxyConfig, TransportError, TungsteniteConnector};
