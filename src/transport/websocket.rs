//! `tokio-tungstenite` implementation of the transport traits.

use std::borrow::Cow;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    SinkExt,
    StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{
    WebSocketStream,
    client_async_tls,
    connect_async,
    tungstenite::{
        self,
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use url::Url;

use super::{
    Connection,
    Connector,
    FrameSink,
    FrameSource,
    InboundFrame,
    ProxyConfig,
    TransportError,
    classify_io,
    proxy::open_tunnel,
};

/// Connector opening real WebSocket connections over TCP and TLS.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(
        &self,
        url: &str,
        proxy: Option<ProxyConfig>,
    ) -> Result<Connection, TransportError> {
        let connection = match proxy {
            None => {
                let (socket, _) = connect_async(url)
                    .await
                    .map_err(|e| handshake_error(url, e))?;
                into_connection(socket)
            }
            Some(proxy) => {
                let tunnel = open_tunnel(&proxy, &target_authority(url)?).await?;
                let (socket, _) = client_async_tls(url, tunnel)
                    .await
                    .map_err(|e| handshake_error(url, e))?;
                into_connection(socket)
            }
        };
        debug!("websocket connected: url={url}");
        Ok(connection)
    }
}

fn into_connection<S>(socket: WebSocketStream<S>) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, source) = socket.split();
    Connection {
        sink: Box::new(WebSocketSink { sink, closed: false }),
        source: Box::new(WebSocketSource { source }),
    }
}

/// `host:port` of the gateway URL, used as the `CONNECT` target.
fn target_authority(url: &str) -> Result<String, TransportError> {
    let parsed = Url::parse(url).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| TransportError::InvalidRequest(format!("{url} has no host")))?;
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| TransportError::InvalidRequest(format!("{url} has no port")))?;
    Ok(format!("{host}:{port}"))
}

fn handshake_error(url: &str, error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::Url(e) => TransportError::InvalidRequest(e.to_string()),
        other => TransportError::Connect {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

fn stream_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        tungstenite::Error::Io(e) => classify_io(e),
        tungstenite::Error::Protocol(e) => {
            warn!("websocket protocol error: {e}");
            TransportError::ConnectionReset
        }
        other => TransportError::Io(std::io::Error::other(other)),
    }
}

struct WebSocketSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    closed: bool,
}

#[async_trait]
impl<S> FrameSink for WebSocketSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_bytes(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sink
            .send(Message::Binary(bytes))
            .await
            .map_err(stream_error)
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Borrowed(""),
        };
        match self.sink.send(Message::Close(Some(frame))).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(stream_error(e)),
        }
    }

    fn is_closed(&self) -> bool { self.closed }
}

struct WebSocketSource<S> {
    source: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameSource for WebSocketSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        loop {
            let message = match self.source.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(stream_error(e))),
            };
            let frame = match message {
                Message::Binary(bytes) => InboundFrame::Binary(Bytes::from(bytes)),
                Message::Text(text) => InboundFrame::Text(text),
                Message::Close(frame) => InboundFrame::Close(frame.map(|f| u16::from(f.code))),
                // Pings are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }
}
