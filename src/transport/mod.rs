//! Transport collaborators used by a shard.
//!
//! A [`Connector`] opens one WebSocket connection per attempt and hands back
//! its two halves: a [`FrameSink`] for outbound bytes and close frames, and a
//! [`FrameSource`] yielding inbound frames until the peer goes away.

use std::{fmt, io};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

use crate::error::ConfigError;

mod proxy;
mod websocket;

pub use self::websocket::TungsteniteConnector;

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established. Retried by the shard.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// URL of the failed attempt.
        url: String,
        /// Human readable cause.
        reason: String,
    },
    /// The URL or proxy configuration cannot produce a valid handshake.
    #[error("invalid handshake request: {0}")]
    InvalidRequest(String),
    /// The peer reset the connection mid-operation.
    #[error("connection reset by peer")]
    ConnectionReset,
    /// The connection was already closed.
    #[error("connection closed")]
    Closed,
    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One inbound WebSocket message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    Binary(Bytes),
    Text(String),
    /// The peer sent a close frame, with its code if one was given.
    Close(Option<u16>),
}

/// Outbound half of a connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSink: Send {
    /// Write one binary message.
    async fn send_bytes(&mut self, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Send a close frame carrying `code`.
    async fn close(&mut self, code: u16) -> Result<(), TransportError>;

    /// Whether a close frame has been sent or the connection has ended.
    fn is_closed(&self) -> bool;
}

/// Inbound half of a connection.
///
/// `next_frame` must be cancellation-safe: the receive loop drops a pending
/// call when it is told to stop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSource: Send {
    /// Next inbound frame, or `None` once the connection has ended.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>>;
}

/// Both halves of an open connection.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens gateway connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a WebSocket connection to `url`, tunnelling through `proxy` when
    /// one is given.
    async fn connect(
        &self,
        url: &str,
        proxy: Option<ProxyConfig>,
    ) -> Result<Connection, TransportError>;
}

/// Basic credentials sent to an HTTP proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// HTTP proxy used to tunnel the gateway connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    url: Url,
    credentials: Option<ProxyCredentials>,
}

impl ProxyConfig {
    /// Parse an `http://host:port` proxy URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidProxy`] if `url` does not parse, is not
    /// an `http` URL or has no host.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardwire::transport::ProxyConfig;
    ///
    /// let proxy = ProxyConfig::new("http://127.0.0.1:3128").expect("valid proxy");
    /// assert_eq!(proxy.authority(), "127.0.0.1:3128");
    /// assert!(ProxyConfig::new("socks5://127.0.0.1:1080").is_err());
    /// ```
    pub fn new(url: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidProxy {
            url: url.to_owned(),
        };
        let parsed = Url::parse(url).map_err(|_| invalid())?;
        if parsed.scheme() != "http" || parsed.host_str().is_none() {
            return Err(invalid());
        }
        Ok(Self {
            url: parsed,
            credentials: None,
        })
    }

    /// Attach basic credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(ProxyCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&ProxyCredentials> { self.credentials.as_ref() }

    /// `host:port` of the proxy, defaulting to port 80.
    #[must_use]
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        let port = self.url.port_or_known_default().unwrap_or(80);
        format!("{host}:{port}")
    }
}

/// Map an I/O error to [`TransportError::ConnectionReset`] where it means the
/// peer went away.
pub(crate) fn classify_io(error: io::Error) -> TransportError {
    match error.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => TransportError::ConnectionReset,
        _ => TransportError::Io(error),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(io::ErrorKind::ConnectionReset)]
    #[case(io::ErrorKind::BrokenPipe)]
    #[case(io::ErrorKind::UnexpectedEof)]
    fn peer_failures_are_resets(#[case] kind: io::ErrorKind) {
        assert!(matches!(
            classify_io(io::Error::from(kind)),
            TransportError::ConnectionReset
        ));
    }

    #[test]
    fn other_io_errors_pass_through() {
        assert!(matches!(
            classify_io(io::Error::from(io::ErrorKind::PermissionDenied)),
            TransportError::Io(_)
        ));
    }

    #[rstest]
    #[case("not a url")]
    #[case("https://proxy.local:443")]
    #[case("http://")]
    fn rejects_unusable_proxies(#[case] url: &str) {
        assert!(matches!(
            ProxyConfig::new(url),
            Err(ConfigError::InvalidProxy { .. })
        ));
    }

    #[test]
    fn proxy_defaults_to_port_80() {
        let proxy = ProxyConfig::new("http://proxy.local").expect("proxy");
        assert_eq!(proxy.authority(), "proxy.local:80");
    }

    #[test]
    fn credentials_are_redacted_in_debug() {
        let proxy = ProxyConfig::new("http://proxy.local:8080")
            .expect("proxy")
            .with_credentials("user", "hunter2");
        let debug = format!("{proxy:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }
}
