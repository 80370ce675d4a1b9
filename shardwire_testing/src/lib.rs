//! Helpers for driving a [`Shard`](shardwire::Shard) against an in-memory
//! gateway in tests.
//!
//! Frame builders produce the JSON envelopes a gateway sends, fixtures wire a
//! shard to a [`ChannelConnector`](shardwire::test_helpers::ChannelConnector),
//! and the logging and metrics helpers capture what the shard reports.
//!
//! ```rust,no_run
//! use shardwire_testing::{TestGateway, frames};
//!
//! # async fn example() {
//! let gateway = TestGateway::new();
//! let shard = gateway.builder().build().expect("shard");
//! let _connecting = tokio::spawn({
//!     let shard = shard.clone();
//!     async move { shard.connect().await }
//! });
//! let mut server = gateway.accept().await;
//! server.send_json(&frames::hello(41_250)).expect("hello");
//! # }
//! ```

pub mod fixtures;
pub mod frames;
pub mod logging;
pub mod macros;
pub mod metrics;

pub use fixtures::{
    HEARTBEAT_INTERVAL_MS,
    TestGateway,
    eventually,
    gateway,
    recording_dispatcher,
};
pub use logging::{LoggerHandle, logger};
pub use metrics::{counter_value, debugging_recorder_setup, gauge_value};
