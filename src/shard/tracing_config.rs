//! Tracing configuration for shard operations.
//!
//! [`TracingConfig`] controls which shard operations emit tracing spans and
//! whether per-operation elapsed-time events are recorded.

use tracing::Level;

/// Controls tracing span levels and per-operation timing for a shard.
///
/// By default, lifecycle operations (`connect`, `close`) emit spans at
/// `INFO` level. High-frequency operations (`send`, `dispatch`, `heartbeat`)
/// emit spans at `DEBUG` level. Timing is disabled for all operations.
///
/// When timing is enabled for an operation, an additional event recording
/// `elapsed_us` is emitted when the operation completes.
///
/// # Examples
///
/// ```
/// use shardwire::shard::TracingConfig;
/// use tracing::Level;
///
/// let config = TracingConfig::default()
///     .with_connect_timing(true)
///     .with_dispatch_level(Level::TRACE);
/// let _ = config;
/// ```
#[expect(
    clippy::struct_excessive_bools,
    reason = "independent timing switches, one per operation"
)]
#[derive(Clone, Debug)]
pub struct TracingConfig {
    pub(crate) connect_level: Level,
    pub(crate) send_level: Level,
    pub(crate) dispatch_level: Level,
    pub(crate) heartbeat_level: Level,
    pub(crate) close_level: Level,
    pub(crate) connect_timing: bool,
    pub(crate) send_timing: bool,
    pub(crate) dispatch_timing: bool,
    pub(crate) close_timing: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            connect_level: Level::INFO,
            send_level: Level::DEBUG,
            dispatch_level: Level::DEBUG,
            heartbeat_level: Level::DEBUG,
            close_level: Level::INFO,
            connect_timing: false,
            send_timing: false,
            dispatch_timing: false,
            close_timing: false,
        }
    }
}

impl TracingConfig {
    /// Set the tracing level for `connect`, including background reconnects.
    #[must_use]
    pub fn with_connect_level(mut self, level: Level) -> Self {
        self.connect_level = level;
        self
    }

    /// Emit `elapsed_us` when a connect attempt finishes.
    #[must_use]
    pub fn with_connect_timing(mut self, enabled: bool) -> Self {
        self.connect_timing = enabled;
        self
    }

    /// Set the tracing level for outbound commands.
    #[must_use]
    pub fn with_send_level(mut self, level: Level) -> Self {
        self.send_level = level;
        self
    }

    /// Emit `elapsed_us` once a command is written, including time spent
    /// waiting on the rate limiter.
    #[must_use]
    pub fn with_send_timing(mut self, enabled: bool) -> Self {
        self.send_timing = enabled;
        self
    }

    /// Set the tracing level for event dispatch.
    #[must_use]
    pub fn with_dispatch_level(mut self, level: Level) -> Self {
        self.dispatch_level = level;
        self
    }

    #[must_use]
    pub fn with_dispatch_timing(mut self, enabled: bool) -> Self {
        self.dispatch_timing = enabled;
        self
    }

    /// Set the tracing level for heartbeat cycles.
    #[must_use]
    pub fn with_heartbeat_level(mut self, level: Level) -> Self {
        self.heartbeat_level = level;
        self
    }

    /// Set the tracing level for `close`.
    #[must_use]
    pub fn with_close_level(mut self, level: Level) -> Self {
        self.close_level = level;
        self
    }

    #[must_use]
    pub fn with_close_timing(mut self, enabled: bool) -> Self {
        self.close_timing = enabled;
        self
    }

    /// Set the tracing level for all operations at once.
    #[must_use]
    pub fn with_all_levels(mut self, level: Level) -> Self {
        self.connect_level = level;
        self.send_level = level;
        self.dispatch_level = level;
        self.heartbeat_level = level;
        self.close_level = level;
        self
    }

    /// Enable or disable timing for all operations at once.
    #[must_use]
    pub fn with_all_timing(mut self, enabled: bool) -> Self {
        self.connect_timing = enabled;
        self.send_timing = enabled;
        self.dispatch_timing = enabled;
        self.close_timing = enabled;
        self
    }
}
