//! A shard wired to an in-memory gateway.

use std::sync::Arc;

use rstest::fixture;
use serde_json::Value;
use shardwire::{
    Dispatcher,
    Handler,
    HandlerError,
    Shard,
    ShardBuilder,
    test_helpers::{ChannelConnector, GatewayConnection},
};
use tokio::sync::mpsc;

use crate::frames;

/// Heartbeat interval used by [`TestGateway::connect`].
pub const HEARTBEAT_INTERVAL_MS: u64 = 41_250;

/// Server side of every connection a test shard opens.
#[derive(Clone, Default)]
pub struct TestGateway {
    connector: ChannelConnector,
}

impl TestGateway {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Connector shared with every shard built by [`builder`](Self::builder).
    #[must_use]
    pub fn connector(&self) -> &ChannelConnector { &self.connector }

    /// Shard builder connecting through this gateway.
    #[must_use]
    pub fn builder(&self) -> ShardBuilder {
        Shard::builder("test-token").connector(self.connector.clone())
    }

    /// Wait for the shard's next connection.
    ///
    /// # Panics
    ///
    /// Panics if the connector was dropped.
    pub async fn accept(&self) -> GatewayConnection {
        self.connector.accept().await.expect("connector dropped")
    }

    /// Connect `shard`, answer with Hello and return the connection together
    /// with the Identify or Resume command the shard sent.
    ///
    /// # Panics
    ///
    /// Panics if the handshake does not complete.
    pub async fn connect(&self, shard: &Shard, resume: bool) -> (GatewayConnection, Value) {
        let connecting = tokio::spawn({
            let shard = shard.clone();
            async move { shard.connect_with(resume).await }
        });
        let mut server = self.accept().await;
        server
            .send_json(&frames::hello(HEARTBEAT_INTERVAL_MS))
            .expect("send hello");
        let command = server.recv_command().await.expect("handshake command");
        connecting
            .await
            .expect("connect task panicked")
            .expect("connect failed");
        (server, command)
    }

    /// Connect `shard` and deliver a ready event for `session_id`, returning
    /// once the shard has recorded the session.
    ///
    /// # Panics
    ///
    /// Panics if the handshake does not complete.
    pub async fn ready(
        &self,
        shard: &Shard,
        session_id: &str,
        resume_url: &str,
    ) -> GatewayConnection {
        let (mut server, _identify) = self.connect(shard, false).await;
        server
            .send_json(&frames::ready(session_id, resume_url, 1))
            .expect("send ready");
        eventually(|| shard.session_id().as_deref() == Some(session_id)).await;
        server
    }
}

/// Dispatcher forwarding every `(event, payload)` pair for `events` to the
/// returned channel.
#[must_use]
pub fn recording_dispatcher(
    events: &[&str],
) -> (Arc<Dispatcher>, mpsc::UnboundedReceiver<(String, Value)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(Dispatcher::new());
    for &event in events {
        let tx = tx.clone();
        let name = event.to_owned();
        dispatcher.add_call(
            event,
            Handler::new(move |payload| {
                let sent = tx
                    .send((name.clone(), payload.to_owned_value()))
                    .map_err(HandlerError::from);
                async move { sent }
            }),
        );
    }
    (dispatcher, rx)
}

/// Yield to other tasks until `condition` holds.
///
/// # Panics
///
/// Panics if the condition is still false after many scheduler turns.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn gateway() -> TestGateway { TestGateway::new() }
