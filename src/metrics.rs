//! Metric helpers for `shardwire`.
//!
//! This module defines metric names and thin helpers wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Gauge tracking shards in the steady state.
pub const SHARDS_ACTIVE: &str = "shardwire_shards_active";
/// Counter of gateway frames, labelled by `direction`.
pub const FRAMES_TOTAL: &str = "shardwire_frames_total";
/// Counter of inbound frames dropped before routing, labelled by `reason`.
pub const FRAMES_DISCARDED: &str = "shardwire_frames_discarded_total";
/// Counter of reconnect attempts, labelled by `resume`.
pub const RECONNECTS_TOTAL: &str = "shardwire_reconnects_total";
/// Counter of heartbeats that went unacknowledged.
pub const HEARTBEAT_TIMEOUTS: &str = "shardwire_heartbeat_timeouts_total";
/// Counter of dispatches that returned an error.
pub const DISPATCH_FAILURES: &str = "shardwire_dispatch_failures_total";

/// Direction of a gateway frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frames received from the gateway.
    Inbound,
    /// Commands sent to the gateway.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "label unused without metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Why an inbound frame was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// The frame did not end with the flush marker.
    Incomplete,
    /// Decompression failed.
    Decompress,
    /// The decompressed bytes were not an envelope.
    Decode,
    /// A text frame on a compressed stream.
    Text,
}

impl DiscardReason {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "label unused without metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            DiscardReason::Incomplete => "incomplete",
            DiscardReason::Decompress => "decompress",
            DiscardReason::Decode => "decode",
            DiscardReason::Text => "text",
        }
    }
}

#[cfg(feature = "metrics")]
mod imp {
    use super::*;

    pub fn inc_active_shards() { gauge!(SHARDS_ACTIVE).increment(1.0); }

    pub fn dec_active_shards() { gauge!(SHARDS_ACTIVE).decrement(1.0); }

    pub fn inc_frames(direction: Direction) {
        counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
    }

    pub fn inc_discarded(reason: DiscardReason) {
        counter!(FRAMES_DISCARDED, "reason" => reason.as_str()).increment(1);
    }

    pub fn inc_reconnects(resume: bool) {
        let label = if resume { "true" } else { "false" };
        counter!(RECONNECTS_TOTAL, "resume" => label).increment(1);
    }

    pub fn inc_heartbeat_timeouts() { counter!(HEARTBEAT_TIMEOUTS).increment(1); }

    pub fn inc_dispatch_failures() { counter!(DISPATCH_FAILURES).increment(1); }
}

#[cfg(not(feature = "metrics"))]
mod imp {
    use super::{Direction, DiscardReason};

    pub fn inc_active_shards() {}

    pub fn dec_active_shards() {}

    pub fn inc_frames(_direction: Direction) {}

    pub fn inc_discarded(_reason: DiscardReason) {}

    pub fn inc_reconnects(_resume: bool) {}

    pub fn inc_heartbeat_timeouts() {}

    pub fn inc_dispatch_failures() {}
}

/// Increment the active shards gauge.
pub fn inc_active_shards() { imp::inc_active_shards(); }

/// Decrement the active shards gauge.
pub fn dec_active_shards() { imp::dec_active_shards(); }

/// Record a frame for the given direction.
pub fn inc_frames(direction: Direction) { imp::inc_frames(direction); }

/// Record a dropped inbound frame.
pub fn inc_discarded(reason: DiscardReason) { imp::inc_discarded(reason); }

/// Record a reconnect attempt.
pub fn inc_reconnects(resume: bool) { imp::inc_reconnects(resume); }

/// Record a heartbeat that was not acknowledged in time.
pub fn inc_heartbeat_timeouts() { imp::inc_heartbeat_timeouts(); }

/// Record a failed dispatch.
pub fn inc_dispatch_failures() { imp::inc_dispatch_failures(); }
