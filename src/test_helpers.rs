#![cfg(any(test, feature = "test-helpers"))]
//! In-memory gateway transport for tests.
//!
//! [`ChannelConnector`] stands in for the WebSocket connector. Every
//! connection the shard opens shows up as a [`GatewayConnection`], the server
//! side of that connection, which can send compressed envelopes, close with a
//! code and observe what the shard wrote.

use std::{
    io,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use flate2::{Compress, Compression, FlushCompress};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::{
    protocol::ZLIB_SUFFIX,
    transport::{
        Connection,
        Connector,
        FrameSink,
        FrameSource,
        InboundFrame,
        ProxyConfig,
        TransportError,
    },
};

/// Something the shard wrote to an in-memory connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientFrame {
    Binary(Bytes),
    Close(u16),
}

impl ClientFrame {
    /// Decode a binary frame as JSON.
    #[must_use]
    pub fn json(&self) -> Option<Value> {
        match self {
            Self::Binary(bytes) => serde_json::from_slice(bytes).ok(),
            Self::Close(_) => None,
        }
    }
}

struct ConnectorState {
    urls: Mutex<Vec<String>>,
    proxies: Mutex<Vec<Option<ProxyConfig>>>,
    fail_next: AtomicUsize,
    opened: mpsc::UnboundedSender<GatewayConnection>,
    accepted: AsyncMutex<mpsc::UnboundedReceiver<GatewayConnection>>,
}

/// Connector producing in-memory connections.
///
/// Clones share state, so a test can keep one clone while the shard owns
/// another.
#[derive(Clone)]
pub struct ChannelConnector {
    state: Arc<ConnectorState>,
}

impl Default for ChannelConnector {
    fn default() -> Self { Self::new() }
}

impl ChannelConnector {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = ConnectorState {
            urls: Mutex::new(Vec::new()),
            proxies: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
            opened: tx,
            accepted: AsyncMutex::new(rx),
        };
        Self {
            state: Arc::new(state),
        }
    }

    /// Every URL passed to `connect`, including failed attempts.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.state
            .urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Proxy configuration passed with every attempt.
    #[must_use]
    pub fn proxies(&self) -> Vec<Option<ProxyConfig>> {
        self.state
            .proxies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of connection attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.state
            .urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Fail the next `count` attempts with [`TransportError::Connect`].
    pub fn fail_next(&self, count: usize) { self.state.fail_next.store(count, Ordering::SeqCst); }

    /// Wait for the next successful connection.
    pub async fn accept(&self) -> Option<GatewayConnection> {
        self.state.accepted.lock().await.recv().await
    }

    /// Next successful connection if one is already open.
    pub fn try_accept(&self) -> Option<GatewayConnection> {
        self.state.accepted.try_lock().ok()?.try_recv().ok()
    }

    fn take_failure(&self) -> bool {
        self.state
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(
        &self,
        url: &str,
        proxy: Option<ProxyConfig>,
    ) -> Result<Connection, TransportError> {
        self.state
            .urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_owned());
        self.state
            .proxies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(proxy);
        if self.take_failure() {
            return Err(TransportError::Connect {
                url: url.to_owned(),
                reason: "scripted failure".into(),
            });
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        let server = GatewayConnection {
            url: url.to_owned(),
            to_client: Some(to_client),
            from_client,
            compressor: Compress::new(Compression::default(), true),
        };
        self.state
            .opened
            .send(server)
            .map_err(|_| TransportError::Closed)?;

        Ok(Connection {
            sink: Box::new(ChannelSink {
                tx: to_server,
                closed: false,
            }),
            source: Box::new(ChannelSource { rx: from_server }),
        })
    }
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<ClientFrame>,
    closed: bool,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_bytes(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(ClientFrame::Binary(Bytes::from(bytes)))
            .map_err(|_| TransportError::ConnectionReset)
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.tx
            .send(ClientFrame::Close(code))
            .map_err(|_| TransportError::ConnectionReset)
    }

    fn is_closed(&self) -> bool { self.closed || self.tx.is_closed() }
}

struct ChannelSource {
    rx: mpsc::UnboundedReceiver<InboundFrame>,
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Server side of one in-memory connection.
pub struct GatewayConnection {
    url: String,
    to_client: Option<mpsc::UnboundedSender<InboundFrame>>,
    from_client: mpsc::UnboundedReceiver<ClientFrame>,
    compressor: Compress,
}

impl std::fmt::Debug for GatewayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnection")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl GatewayConnection {
    /// URL the shard connected to.
    #[must_use]
    pub fn url(&self) -> &str { &self.url }

    /// Compress `value` onto this connection's zlib stream, ending at a
    /// flush marker, without sending it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or compression fails.
    pub fn compress(&mut self, value: &Value) -> io::Result<Vec<u8>> {
        let json = serde_json::to_vec(value).map_err(io::Error::other)?;
        let mut out = Vec::with_capacity(json.len() + 64);
        let start = self.compressor.total_in();
        loop {
            let consumed = usize::try_from(self.compressor.total_in() - start)
                .map_err(io::Error::other)?;
            if out.len() == out.capacity() {
                out.reserve(out.capacity().max(64));
            }
            self.compressor
                .compress_vec(&json[consumed..], &mut out, FlushCompress::Sync)
                .map_err(io::Error::other)?;
            let consumed = usize::try_from(self.compressor.total_in() - start)
                .map_err(io::Error::other)?;
            if consumed == json.len() && out.len() < out.capacity() && out.ends_with(&ZLIB_SUFFIX) {
                return Ok(out);
            }
        }
    }

    /// Compress and send `value` as one binary frame.
    ///
    /// # Errors
    ///
    /// Returns an error if compression fails or the shard dropped the
    /// connection.
    pub fn send_json(&mut self, value: &Value) -> io::Result<()> {
        let frame = self.compress(value)?;
        self.send_raw(frame)
    }

    /// Send raw bytes as one binary frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the shard dropped the connection.
    pub fn send_raw(&self, bytes: impl Into<Bytes>) -> io::Result<()> {
        self.deliver(InboundFrame::Binary(bytes.into()))
    }

    /// Send a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the shard dropped the connection.
    pub fn send_text(&self, text: impl Into<String>) -> io::Result<()> {
        self.deliver(InboundFrame::Text(text.into()))
    }

    /// Send a close frame carrying `code`, then end the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the shard dropped the connection.
    pub fn close(&mut self, code: Option<u16>) -> io::Result<()> {
        let result = self.deliver(InboundFrame::Close(code));
        self.to_client = None;
        result
    }

    /// End the connection without a close frame.
    pub fn disconnect(&mut self) { self.to_client = None; }

    /// Make further writes from the shard fail as if the peer reset the
    /// connection. Inbound delivery keeps working.
    pub fn reset_writes(&mut self) { self.from_client.close(); }

    /// Next frame the shard wrote, or `None` once it dropped its sink.
    pub async fn recv(&mut self) -> Option<ClientFrame> { self.from_client.recv().await }

    /// Next JSON command the shard wrote, skipping close frames.
    pub async fn recv_command(&mut self) -> Option<Value> {
        while let Some(frame) = self.recv().await {
            if let Some(value) = frame.json() {
                return Some(value);
            }
        }
        None
    }

    /// Frame already written by the shard, without waiting.
    pub fn try_recv(&mut self) -> Option<ClientFrame> { self.from_client.try_recv().ok() }

    fn deliver(&self, frame: InboundFrame) -> io::Result<()> {
        let tx = self
            .to_client
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        tx.send(frame)
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::inflate::Inflater;

    #[tokio::test]
    async fn connections_are_handed_to_the_server_side() {
        let connector = ChannelConnector::new();
        let Connection { mut sink, mut source } = connector
            .connect("wss://example/?v=10", None)
            .await
            .expect("connect");
        let mut server = connector.accept().await.expect("server side");
        assert_eq!(server.url(), "wss://example/?v=10");

        server.send_json(&json!({"op": 11})).expect("send");
        let Some(Ok(InboundFrame::Binary(frame))) = source.next_frame().await else {
            panic!("expected binary frame");
        };
        let inflated = Inflater::default()
            .push(&frame)
            .expect("inflate")
            .expect("complete frame");
        assert_eq!(inflated, br#"{"op":11}"#);

        sink.send_bytes(b"{}".to_vec()).await.expect("send");
        assert_eq!(server.recv_command().await, Some(json!({})));
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed() {
        let connector = ChannelConnector::new();
        connector.fail_next(2);
        for _ in 0..2 {
            assert!(matches!(
                connector.connect("wss://a", None).await,
                Err(TransportError::Connect { .. })
            ));
        }
        assert!(connector.connect("wss://a", None).await.is_ok());
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test]
    async fn reset_writes_fail_with_connection_reset() {
        let connector = ChannelConnector::new();
        let Connection { mut sink, .. } = connector.connect("wss://a", None).await.expect("connect");
        let mut server = connector.accept().await.expect("server side");
        server.reset_writes();
        assert!(matches!(
            sink.send_bytes(b"{}".to_vec()).await,
            Err(TransportError::ConnectionReset)
        ));
        assert!(sink.is_closed());
    }
}
