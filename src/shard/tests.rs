//! Unit tests for the shard state machine using mocked transports.

use std::time::Duration;

use rstest::{fixture, rstest};
use tokio::time::Instant;

use super::*;
use crate::transport::{MockConnector, MockFrameSink, TransportError};

fn shard_with(connector: MockConnector) -> Shard {
    Shard::builder("token")
        .connector(connector)
        .build()
        .expect("valid shard")
}

#[fixture]
fn idle_shard() -> Shard { shard_with(MockConnector::new()) }

#[rstest]
#[tokio::test]
async fn send_without_transport_is_not_connected(idle_shard: Shard) {
    let err = idle_shard
        .send(&Command::heartbeat(None))
        .await
        .expect_err("no transport");
    assert!(matches!(err, ShardError::NotConnected));
    assert_eq!(idle_shard.rate_limiter().available(), 110, "no permit taken");
}

#[rstest]
#[tokio::test]
async fn close_without_transport_is_not_connected(idle_shard: Shard) {
    assert!(matches!(
        idle_shard.close().await,
        Err(ShardError::NotConnected)
    ));
}

#[rstest]
#[tokio::test]
async fn connect_on_active_shard_is_rejected(idle_shard: Shard) {
    idle_shard.set_state(ShardState::Steady);
    assert!(matches!(
        idle_shard.connect().await,
        Err(ShardError::AlreadyConnected)
    ));
    assert_eq!(idle_shard.state(), ShardState::Steady);
}

#[tokio::test]
async fn invalid_request_is_not_retried() {
    let mut connector = MockConnector::new();
    connector
        .expect_connect()
        .times(1)
        .returning(|_, _| Err(TransportError::InvalidRequest("bad url".into())));
    let shard = shard_with(connector);

    let err = shard.connect().await.expect_err("invalid request");
    assert!(matches!(
        err,
        ShardError::Transport(TransportError::InvalidRequest(_))
    ));
    assert_eq!(shard.state(), ShardState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn connect_failures_wait_fixed_backoff() {
    let mut connector = MockConnector::new();
    let mut calls = 0;
    connector.expect_connect().times(3).returning(move |url, _| {
        calls += 1;
        if calls < 3 {
            Err(TransportError::Connect {
                url: url.to_owned(),
                reason: "refused".into(),
            })
        } else {
            Err(TransportError::InvalidRequest("stop".into()))
        }
    });
    let shard = shard_with(connector);

    let started = Instant::now();
    let _ = shard.connect().await;
    assert_eq!(started.elapsed(), Duration::from_secs(20));
}

#[tokio::test]
async fn connect_uses_configured_gateway_url() {
    let mut connector = MockConnector::new();
    connector
        .expect_connect()
        .withf(|url, proxy| {
            url == "wss://gw.test/?v=9&encoding=json&compress=zlib-stream" && proxy.is_none()
        })
        .times(1)
        .returning(|_, _| Err(TransportError::InvalidRequest("stop".into())));
    let shard = Shard::builder("token")
        .gateway_base("wss://gw.test")
        .version(9)
        .connector(connector)
        .build()
        .expect("shard");
    let _ = shard.connect().await;
}

#[tokio::test]
async fn send_encodes_through_the_sink() {
    let mut sink = MockFrameSink::new();
    sink.expect_send_bytes()
        .withf(|bytes| bytes.as_slice() == br#"{"op":1,"d":3}"#)
        .times(1)
        .returning(|_| Ok(()));
    let shard = shard_with(MockConnector::new());
    *shard.inner.sink.lock().await = Some(Box::new(sink));

    shard
        .send(&Command::heartbeat(Some(3)))
        .await
        .expect("sent");
    assert_eq!(shard.rate_limiter().available(), 109);
}

#[tokio::test]
async fn reset_during_send_is_reported() {
    let mut sink = MockFrameSink::new();
    sink.expect_send_bytes()
        .returning(|_| Err(TransportError::ConnectionReset));
    let shard = shard_with(MockConnector::new());
    *shard.inner.sink.lock().await = Some(Box::new(sink));

    let err = shard
        .send(&Command::heartbeat(None))
        .await
        .expect_err("reset");
    assert!(err.is_connection_reset());
}

#[tokio::test]
async fn close_sends_normal_close_and_stays_down() {
    let mut sink = MockFrameSink::new();
    sink.expect_is_closed().return_const(false);
    sink.expect_close()
        .withf(|code| *code == 1000)
        .times(1)
        .returning(|_| Ok(()));
    let shard = shard_with(MockConnector::new());
    *shard.inner.sink.lock().await = Some(Box::new(sink));
    shard.set_state(ShardState::Steady);

    shard.close().await.expect("closed");
    assert_eq!(shard.state(), ShardState::Disconnected);
    assert!(shard.inner.sink.lock().await.is_none());
    assert!(shard.is_stopped());
    shard.reconnect(true).await.expect("reconnect is a no-op");
    assert_eq!(shard.state(), ShardState::Disconnected);
}

#[tokio::test]
async fn fatal_close_is_reported_through_failure() {
    let shard = Shard::builder("token")
        .connector(MockConnector::new())
        .close_code_policy(CloseCodePolicy::Corrected)
        .build()
        .expect("shard");

    let err = shard.handle_close(Some(4004)).await.expect_err("fatal");
    assert!(matches!(
        err,
        ShardError::UnrecoverableSession { code: 4004 }
    ));
    assert!(matches!(
        shard.failure().await,
        ShardError::UnrecoverableSession { code: 4004 }
    ));
}
