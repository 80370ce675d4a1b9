//! Tests for the in-memory gateway helpers.

use rstest::rstest;
use serde_json::json;
use shardwire::ShardState;
use shardwire_testing::{TestGateway, frames, gateway};

#[test]
fn frame_builders_use_gateway_opcodes() {
    assert_eq!(frames::hello(1000)["d"]["heartbeat_interval"], 1000);
    assert_eq!(frames::heartbeat_ack()["op"], 11);
    assert_eq!(frames::reconnect()["op"], 7);
    assert_eq!(frames::invalid_session(true), json!({"op": 9, "d": true, "s": null, "t": null}));
    let ready = frames::ready("abc", "wss://resume", 5);
    assert_eq!(ready["t"], "READY");
    assert_eq!(ready["s"], 5);
    assert_eq!(ready["d"]["session_id"], "abc");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn ready_returns_once_session_is_recorded(gateway: TestGateway) {
    let shard = gateway.builder().build().expect("shard");
    let _server = gateway.ready(&shard, "abc", "wss://resume").await;

    assert_eq!(shard.state(), ShardState::Steady);
    assert_eq!(shard.session_id().as_deref(), Some("abc"));
    assert_eq!(gateway.connector().attempts(), 1);
}
