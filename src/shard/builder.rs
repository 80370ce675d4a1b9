//! Builder for [`Shard`].

use std::{sync::Arc, time::Duration};

use super::{CloseCodePolicy, ReconnectBackoff, Shard, ShardConfig, TracingConfig};
use crate::{
    dispatch::Dispatcher,
    error::ConfigError,
    inflate::FrameAssembly,
    ratelimit::{DEFAULT_CAPACITY, DEFAULT_WINDOW, RateLimiter},
    session::ShardInfo,
    transport::{Connector, ProxyConfig, TungsteniteConnector},
};

/// Builder for [`Shard`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use shardwire::{Dispatcher, Shard};
///
/// let dispatcher = Arc::new(Dispatcher::new());
/// let shard = Shard::builder("token")
///     .intents(513)
///     .shard(0, 2)
///     .dispatcher(Arc::clone(&dispatcher))
///     .build()
///     .expect("valid configuration");
/// assert_eq!(shard.shard_info().count, 2);
/// ```
#[must_use = "call `build` to create the shard"]
pub struct ShardBuilder {
    config: ShardConfig,
    rate_limit: (usize, Duration),
    dispatcher: Option<Arc<Dispatcher>>,
    connector: Option<Arc<dyn Connector>>,
}

impl ShardBuilder {
    pub(crate) fn new(token: impl Into<String>) -> Self {
        Self {
            config: ShardConfig::new(token.into()),
            rate_limit: (DEFAULT_CAPACITY, DEFAULT_WINDOW),
            dispatcher: None,
            connector: None,
        }
    }

    /// Declared gateway intents bitmask.
    pub fn intents(mut self, intents: u64) -> Self {
        self.config.intents = intents;
        self
    }

    /// Member count above which guilds are sent without offline members.
    pub fn large_threshold(mut self, threshold: u32) -> Self {
        self.config.large_threshold = threshold;
        self
    }

    /// Library name reported as browser and device.
    pub fn library(mut self, library: impl Into<String>) -> Self {
        self.config.library = library.into();
        self
    }

    /// Tunnel connections through an HTTP proxy.
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    /// Shard index and total shard count.
    pub fn shard(mut self, index: u32, count: u32) -> Self {
        self.config.shard = ShardInfo::new(index, count);
        self
    }

    /// Gateway host used for fresh connections, without a trailing slash.
    pub fn gateway_base(mut self, base: impl Into<String>) -> Self {
        self.config.gateway_base = base.into();
        self
    }

    /// Gateway protocol version.
    pub fn version(mut self, version: u8) -> Self {
        self.config.version = version;
        self
    }

    /// Outbound command budget.
    pub fn rate_limit(mut self, capacity: usize, window: Duration) -> Self {
        self.rate_limit = (capacity, window);
        self
    }

    /// Time allowed for a heartbeat ack before the connection is abandoned.
    pub fn heartbeat_ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Give up on a connection that sends no Hello within `timeout`.
    ///
    /// Without this, `connect` waits for Hello indefinitely.
    pub fn hello_timeout(mut self, timeout: Duration) -> Self {
        self.config.hello_timeout = Some(timeout);
        self
    }

    /// Delay between failed connection attempts.
    pub fn reconnect_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.config.backoff = backoff.normalized();
        self
    }

    /// Treatment of binary frames lacking the flush marker.
    pub fn frame_assembly(mut self, assembly: FrameAssembly) -> Self {
        self.config.frame_assembly = assembly;
        self
    }

    /// Mapping of close codes to recovery actions.
    pub fn close_code_policy(mut self, policy: CloseCodePolicy) -> Self {
        self.config.close_policy = policy;
        self
    }

    pub fn tracing_config(mut self, tracing: TracingConfig) -> Self {
        self.config.tracing = tracing;
        self
    }

    /// Share `dispatcher` with this shard. A fresh dispatcher is used
    /// otherwise.
    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Open connections with `connector` instead of [`TungsteniteConnector`].
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Validate the configuration and create the shard.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingToken`] for an empty token,
    /// [`ConfigError::InvalidShard`] if the shard index is not below a
    /// non-zero shard count, and the rate limiter's errors for a zero
    /// capacity or window.
    pub fn build(self) -> Result<Shard, ConfigError> {
        if self.config.token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        let ShardInfo { index, count } = self.config.shard;
        if count > 0 && index >= count {
            return Err(ConfigError::InvalidShard { index, count });
        }
        let (capacity, window) = self.rate_limit;
        let limiter = RateLimiter::new(capacity, window)?;
        Ok(Shard::from_parts(
            self.config,
            self.connector
                .unwrap_or_else(|| Arc::new(TungsteniteConnector)),
            self.dispatcher.unwrap_or_default(),
            limiter,
        ))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 0)]
    #[case(0, 1)]
    #[case(3, 4)]
    fn accepts_valid_shard_pairs(#[case] index: u32, #[case] count: u32) {
        assert!(Shard::builder("t").shard(index, count).build().is_ok());
    }

    #[rstest]
    #[case(1, 1)]
    #[case(5, 4)]
    fn rejects_out_of_range_shard(#[case] index: u32, #[case] count: u32) {
        assert_eq!(
            Shard::builder("t").shard(index, count).build().err(),
            Some(ConfigError::InvalidShard { index, count })
        );
    }

    #[test]
    fn rejects_empty_token() {
        assert_eq!(
            Shard::builder("").build().err(),
            Some(ConfigError::MissingToken)
        );
    }

    #[test]
    fn rejects_zero_rate_limit() {
        assert_eq!(
            Shard::builder("t")
                .rate_limit(0, Duration::from_secs(1))
                .build()
                .err(),
            Some(ConfigError::InvalidCapacity)
        );
    }

    #[test]
    fn defaults_match_gateway_conventions() {
        let shard = Shard::builder("t").build().expect("shard");
        let config = shard.config();
        assert_eq!(config.large_threshold(), 250);
        assert_eq!(config.library(), "shardwire");
        assert_eq!(config.version(), 10);
        assert_eq!(config.gateway_base(), "wss://gateway.discord.gg");
        assert_eq!(config.ack_timeout(), Duration::from_secs(5));
        assert_eq!(config.hello_timeout(), None);
        assert_eq!(config.backoff(), ReconnectBackoff::fixed(Duration::from_secs(10)));
        assert_eq!(config.frame_assembly(), FrameAssembly::Buffer);
        assert_eq!(config.close_policy(), CloseCodePolicy::Literal);
        assert_eq!(shard.rate_limiter().capacity(), 110);
        assert_eq!(shard.rate_limiter().window(), Duration::from_secs(60));
    }
}
