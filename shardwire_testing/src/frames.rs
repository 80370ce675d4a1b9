//! JSON envelopes a gateway sends to a shard.

use serde_json::{Value, json};

/// Hello announcing a heartbeat interval in milliseconds.
#[must_use]
pub fn hello(interval_ms: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": interval_ms}, "s": null, "t": null})
}

/// Ready dispatch carrying a session id and resume host.
#[must_use]
pub fn ready(session_id: &str, resume_url: &str, seq: u64) -> Value {
    dispatch(
        "READY",
        json!({
            "v": 10,
            "session_id": session_id,
            "resume_gateway_url": resume_url,
            "user": {"id": "1", "username": "bot"},
            "guilds": [],
        }),
        seq,
    )
}

/// Dispatch of `event` with payload `d`.
#[must_use]
pub fn dispatch(event: &str, d: Value, seq: u64) -> Value {
    json!({"op": 0, "d": d, "s": seq, "t": event})
}

#[must_use]
pub fn heartbeat_ack() -> Value { json!({"op": 11, "d": null, "s": null, "t": null}) }

/// Gateway request for an immediate heartbeat.
#[must_use]
pub fn heartbeat_request() -> Value { json!({"op": 1, "d": null, "s": null, "t": null}) }

#[must_use]
pub fn reconnect() -> Value { json!({"op": 7, "d": null, "s": null, "t": null}) }

/// Invalid session; the shard starts over regardless of `resumable`.
#[must_use]
pub fn invalid_session(resumable: bool) -> Value {
    json!({"op": 9, "d": resumable, "s": null, "t": null})
}
