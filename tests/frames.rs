//! Inbound frames that are split, truncated or not compressed.

use std::time::Duration;

use rstest::rstest;
use serde_json::json;
use shardwire::inflate::FrameAssembly;
use shardwire_testing::{TestGateway, frames, gateway, recording_dispatcher, recv_expect};

#[rstest]
#[tokio::test(start_paused = true)]
async fn split_frames_are_reassembled(gateway: TestGateway) {
    let shard = gateway.builder().build().expect("shard");
    let (mut server, _) = gateway.connect(&shard, false).await;

    let frame = server
        .compress(&frames::heartbeat_request())
        .expect("compress");
    let (head, tail) = frame.split_at(frame.len() / 2);
    server.send_raw(head.to_vec()).expect("head");
    server.send_raw(tail.to_vec()).expect("tail");

    assert_eq!(recv_expect!(server.recv_command())["op"], 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn short_frames_leave_the_session_untouched(gateway: TestGateway) {
    let (dispatcher, mut events) = recording_dispatcher(&["READY", "TYPING_START"]);
    let shard = gateway
        .builder()
        .dispatcher(dispatcher)
        .build()
        .expect("shard");
    let mut server = gateway.ready(&shard, "abc", "wss://resume.test").await;
    assert_eq!(recv_expect!(events.recv()).0, "READY");

    server.send_raw(&b"\x00\xff"[..]).expect("short frame");
    server.send_raw(&b"\xff"[..]).expect("short frame");
    server
        .send_json(&frames::heartbeat_request())
        .expect("request");
    let heartbeat = recv_expect!(server.recv_command());
    assert_eq!(heartbeat, json!({"op": 1, "d": 1}));
    assert_eq!(shard.sequence(), Some(1));

    // Let any spawned dispatch run before checking.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(events.try_recv().is_err(), "short frame was dispatched");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn unmarked_frames_are_dropped_when_discarding(gateway: TestGateway) {
    let shard = gateway
        .builder()
        .frame_assembly(FrameAssembly::Discard)
        .build()
        .expect("shard");
    let (mut server, _) = gateway.connect(&shard, false).await;

    server.send_raw(&b"\xff"[..]).expect("short frame");
    server
        .send_raw(&br#"{"op":1}"#[..])
        .expect("frame without marker");
    server
        .send_json(&frames::dispatch("TYPING_START", json!({}), 4))
        .expect("dispatch");
    server
        .send_json(&frames::heartbeat_request())
        .expect("request");

    let heartbeat = recv_expect!(server.recv_command());
    assert_eq!(heartbeat, json!({"op": 1, "d": 4}));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn text_frames_are_ignored(gateway: TestGateway) {
    let shard = gateway.builder().build().expect("shard");
    let (mut server, _) = gateway.connect(&shard, false).await;

    server
        .send_text(r#"{"op":1,"d":null}"#)
        .expect("text frame");
    server
        .send_json(&frames::heartbeat_request())
        .expect("request");
    let heartbeat = recv_expect!(server.recv_command());
    assert_eq!(heartbeat["op"], 1);
    assert!(server.try_recv().is_none(), "text frame produced a reply");
}
