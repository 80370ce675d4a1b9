//! Span and timing helpers for shard operations.

use std::time::Instant;

use tracing::{Level, Span};

use super::tracing_config::TracingConfig;

/// Create a span at a level chosen at runtime.
macro_rules! dynamic_span {
    ($level:expr, $name:expr $(, $($field:tt)*)?) => {
        match $level {
            Level::ERROR => tracing::error_span!($name $(, $($field)*)?),
            Level::WARN  => tracing::warn_span!($name $(, $($field)*)?),
            Level::INFO  => tracing::info_span!($name $(, $($field)*)?),
            Level::DEBUG => tracing::debug_span!($name $(, $($field)*)?),
            Level::TRACE => tracing::trace_span!($name $(, $($field)*)?),
        }
    };
}

#[expect(
    clippy::cognitive_complexity,
    reason = "complexity from dynamic_span! macro expansion"
)]
pub(crate) fn connect_span(config: &TracingConfig, shard: u32, resume: bool) -> Span {
    dynamic_span!(
        config.connect_level,
        "shard.connect",
        shard = shard,
        resume = resume,
        url = tracing::field::Empty
    )
}

#[expect(
    clippy::cognitive_complexity,
    reason = "complexity from dynamic_span! macro expansion"
)]
pub(crate) fn send_span(config: &TracingConfig, op: u8) -> Span {
    dynamic_span!(
        config.send_level,
        "shard.send",
        op = op,
        frame.bytes = tracing::field::Empty
    )
}

#[expect(
    clippy::cognitive_complexity,
    reason = "complexity from dynamic_span! macro expansion"
)]
pub(crate) fn dispatch_span(config: &TracingConfig, event: &str) -> Span {
    dynamic_span!(config.dispatch_level, "shard.dispatch", event = event)
}

#[expect(
    clippy::cognitive_complexity,
    reason = "complexity from dynamic_span! macro expansion"
)]
pub(crate) fn heartbeat_span(config: &TracingConfig, shard: u32) -> Span {
    dynamic_span!(config.heartbeat_level, "shard.heartbeat", shard = shard)
}

#[expect(
    clippy::cognitive_complexity,
    reason = "complexity from dynamic_span! macro expansion"
)]
pub(crate) fn close_span(config: &TracingConfig, shard: u32) -> Span {
    dynamic_span!(config.close_level, "shard.close", shard = shard)
}

/// Start a timer when `enabled`.
pub(crate) fn timer(enabled: bool) -> Option<Instant> { enabled.then(Instant::now) }

/// Emit `elapsed_us` at `DEBUG` if a timer was started.
pub(crate) fn emit_timing_event(start: Option<Instant>) {
    if let Some(start) = start {
        let elapsed_us = start.elapsed().as_micros();
        tracing::debug!(elapsed_us = elapsed_us, "operation.timing");
    }
}
