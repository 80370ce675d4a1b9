//! Resolved shard configuration.

use std::{fmt, time::Duration};

use super::{CloseCodePolicy, ReconnectBackoff, TracingConfig};
use crate::{
    heartbeat::DEFAULT_ACK_TIMEOUT,
    inflate::FrameAssembly,
    protocol::{ClientProperties, IdentifyPayload, ResumePayload},
    session::{SessionState, ShardInfo},
    transport::ProxyConfig,
};

/// Default large-guild threshold sent with identify.
pub const DEFAULT_LARGE_THRESHOLD: u32 = 250;
/// Default library name reported as browser and device.
pub const DEFAULT_LIBRARY: &str = "shardwire";
/// Default gateway host.
pub const DEFAULT_GATEWAY: &str = "wss://gateway.discord.gg";
/// Default gateway protocol version.
pub const DEFAULT_VERSION: u8 = 10;

/// Everything a shard needs to connect, produced by
/// [`ShardBuilder`](super::ShardBuilder).
#[derive(Clone)]
pub struct ShardConfig {
    pub(crate) token: String,
    pub(crate) intents: u64,
    pub(crate) large_threshold: u32,
    pub(crate) library: String,
    pub(crate) proxy: Option<ProxyConfig>,
    pub(crate) shard: ShardInfo,
    pub(crate) gateway_base: String,
    pub(crate) version: u8,
    pub(crate) ack_timeout: Duration,
    pub(crate) hello_timeout: Option<Duration>,
    pub(crate) backoff: ReconnectBackoff,
    pub(crate) frame_assembly: FrameAssembly,
    pub(crate) close_policy: CloseCodePolicy,
    pub(crate) tracing: TracingConfig,
}

impl ShardConfig {
    pub(crate) fn new(token: String) -> Self {
        Self {
            token,
            intents: 0,
            large_threshold: DEFAULT_LARGE_THRESHOLD,
            library: DEFAULT_LIBRARY.to_owned(),
            proxy: None,
            shard: ShardInfo::default(),
            gateway_base: DEFAULT_GATEWAY.to_owned(),
            version: DEFAULT_VERSION,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            hello_timeout: None,
            backoff: ReconnectBackoff::default(),
            frame_assembly: FrameAssembly::default(),
            close_policy: CloseCodePolicy::default(),
            tracing: TracingConfig::default(),
        }
    }

    #[must_use]
    pub fn intents(&self) -> u64 { self.intents }

    #[must_use]
    pub fn large_threshold(&self) -> u32 { self.large_threshold }

    #[must_use]
    pub fn library(&self) -> &str { &self.library }

    #[must_use]
    pub fn proxy(&self) -> Option<&ProxyConfig> { self.proxy.as_ref() }

    #[must_use]
    pub fn shard(&self) -> ShardInfo { self.shard }

    #[must_use]
    pub fn gateway_base(&self) -> &str { &self.gateway_base }

    #[must_use]
    pub fn version(&self) -> u8 { self.version }

    #[must_use]
    pub fn ack_timeout(&self) -> Duration { self.ack_timeout }

    #[must_use]
    pub fn hello_timeout(&self) -> Option<Duration> { self.hello_timeout }

    #[must_use]
    pub fn backoff(&self) -> ReconnectBackoff { self.backoff }

    #[must_use]
    pub fn frame_assembly(&self) -> FrameAssembly { self.frame_assembly }

    #[must_use]
    pub fn close_policy(&self) -> CloseCodePolicy { self.close_policy }

    #[must_use]
    pub fn tracing(&self) -> &TracingConfig { &self.tracing }

    pub(crate) fn identify_payload(&self) -> IdentifyPayload {
        IdentifyPayload {
            token: self.token.clone(),
            properties: ClientProperties::for_library(&self.library),
            compress: true,
            large_threshold: self.large_threshold,
            intents: self.intents,
            shard: self.shard.as_pair(),
        }
    }

    pub(crate) fn resume_payload(&self, session: &SessionState) -> ResumePayload {
        ResumePayload {
            token: self.token.clone(),
            session_id: session.session_id().map(str::to_owned),
            seq: session.sequence(),
        }
    }
}

impl fmt::Debug for ShardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardConfig")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("large_threshold", &self.large_threshold)
            .field("library", &self.library)
            .field("proxy", &self.proxy)
            .field("shard", &self.shard)
            .field("gateway_base", &self.gateway_base)
            .field("version", &self.version)
            .field("ack_timeout", &self.ack_timeout)
            .field("hello_timeout", &self.hello_timeout)
            .field("backoff", &self.backoff)
            .field("frame_assembly", &self.frame_assembly)
            .field("close_policy", &self.close_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn debug_output_redacts_token() {
        let config = ShardConfig::new("secret-token".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn resume_payload_uses_session_state() {
        let config = ShardConfig::new("t".into());
        let mut session = SessionState::default();
        session.record_ready(&json!({"session_id": "abc", "resume_gateway_url": "wss://x"}));
        session.observe_sequence(Some(12));
        let payload = config.resume_payload(&session);
        assert_eq!(payload.session_id.as_deref(), Some("abc"));
        assert_eq!(payload.seq, Some(12));
    }
}
