//! Gateway wire vocabulary.
//!
//! Opcodes, the inbound [`Envelope`], outbound [`Command`]s and the close-code
//! tables used to decide how a dropped session is recovered.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trailing bytes marking a flush boundary in a zlib stream.
pub const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Event type announcing a freshly established session.
pub const READY_EVENT: &str = "READY";

/// Close code sent when the gateway asks the client to reconnect.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// Close code sent when the connection is abandoned as a zombie.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Close code sent for a normal, client-initiated close.
pub const CLOSE_NORMAL: u16 = 1000;

/// Gateway close codes after which resuming is safe.
pub const RESUMABLE_CLOSE_CODES: [u16; 8] = [4000, 4001, 4002, 4003, 4005, 4007, 4008, 4009];

/// Gateway close codes after which the session cannot be recovered:
/// authentication failed, invalid shard, disallowed intents.
pub const FATAL_CLOSE_CODES: [u16; 3] = [4004, 4011, 4014];

/// Integer tags selecting an envelope's meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    Dispatch,
    Heartbeat,
    Identify,
    Resume,
    Reconnect,
    InvalidSession,
    Hello,
    HeartbeatAck,
}

impl OpCode {
    /// Numeric value written to the `op` field.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            6 => Self::Resume,
            7 => Self::Reconnect,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => return Err(other),
        })
    }
}

/// One decoded inbound frame.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Envelope {
    /// Raw opcode; see [`OpCode`].
    pub op: u8,
    /// Payload; object, integer or null depending on the opcode.
    #[serde(default)]
    pub d: Value,
    /// Sequence number, present on dispatches.
    #[serde(default)]
    pub s: Option<u64>,
    /// Event type, present on dispatches.
    #[serde(default)]
    pub t: Option<String>,
}

impl Envelope {
    /// Interpret the raw opcode.
    ///
    /// # Errors
    ///
    /// Returns the raw value if it is not a known opcode.
    pub fn opcode(&self) -> Result<OpCode, u8> { OpCode::try_from(self.op) }

    /// Heartbeat interval carried by a Hello payload, in milliseconds.
    ///
    /// Fractional intervals are truncated; negative or non-numeric ones
    /// yield `None`.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "the float is finite and non-negative"
    )]
    pub fn heartbeat_interval_ms(&self) -> Option<u64> {
        let interval = self.d.get("heartbeat_interval")?;
        interval.as_u64().or_else(|| {
            interval
                .as_f64()
                .filter(|ms| ms.is_finite() && *ms >= 0.0)
                .map(|ms| ms as u64)
        })
    }
}

/// Outbound command written to the gateway.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Command {
    /// Opcode of the command.
    pub op: u8,
    /// Command payload.
    pub d: CommandData,
}

/// Payload of an outbound [`Command`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandData {
    /// Last sequence seen, or null.
    Sequence(Option<u64>),
    Identify(IdentifyPayload),
    Resume(ResumePayload),
}

impl Command {
    /// Heartbeat carrying the last sequence seen, or null.
    #[must_use]
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self {
            op: OpCode::Heartbeat.code(),
            d: CommandData::Sequence(sequence),
        }
    }

    /// Identify command establishing a new session.
    #[must_use]
    pub fn identify(payload: IdentifyPayload) -> Self {
        Self {
            op: OpCode::Identify.code(),
            d: CommandData::Identify(payload),
        }
    }

    /// Resume command re-establishing an existing session.
    #[must_use]
    pub fn resume(payload: ResumePayload) -> Self {
        Self {
            op: OpCode::Resume.code(),
            d: CommandData::Resume(payload),
        }
    }
}

/// Client metadata reported when identifying.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClientProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl ClientProperties {
    /// Properties for the running host, naming `library` as browser and device.
    #[must_use]
    pub fn for_library(library: &str) -> Self {
        Self {
            os: std::env::consts::OS.to_owned(),
            browser: library.to_owned(),
            device: library.to_owned(),
        }
    }
}

/// Payload of an Identify command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub properties: ClientProperties,
    pub compress: bool,
    pub large_threshold: u32,
    pub intents: u64,
    pub shard: [u32; 2],
}

/// Payload of a Resume command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: Option<String>,
    pub seq: Option<u64>,
}

/// Build the handshake URL for `base`.
///
/// # Examples
///
/// ```
/// use shardwire::protocol::gateway_url;
///
/// assert_eq!(
///     gateway_url("wss://gateway.discord.gg", 10),
///     "wss://gateway.discord.gg/?v=10&encoding=json&compress=zlib-stream"
/// );
/// ```
#[must_use]
pub fn gateway_url(base: &str, version: u8) -> String {
    format!("{base}/?v={version}&encoding=json&compress=zlib-stream")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(0, OpCode::Dispatch)]
    #[case(1, OpCode::Heartbeat)]
    #[case(2, OpCode::Identify)]
    #[case(6, OpCode::Resume)]
    #[case(7, OpCode::Reconnect)]
    #[case(9, OpCode::InvalidSession)]
    #[case(10, OpCode::Hello)]
    #[case(11, OpCode::HeartbeatAck)]
    fn opcode_round_trips(#[case] raw: u8, #[case] op: OpCode) {
        assert_eq!(OpCode::try_from(raw), Ok(op));
        assert_eq!(op.code(), raw);
    }

    #[rstest]
    #[case(3)]
    #[case(8)]
    #[case(12)]
    fn unknown_opcodes_are_rejected(#[case] raw: u8) {
        assert_eq!(OpCode::try_from(raw), Err(raw));
    }

    #[test]
    fn heartbeat_without_sequence_is_null() {
        let command = Command::heartbeat(None);
        assert_eq!(
            serde_json::to_value(&command).expect("encode"),
            json!({"op": 1, "d": null})
        );
    }

    #[test]
    fn identify_carries_shard_pair() {
        let payload = IdentifyPayload {
            token: "t".into(),
            properties: ClientProperties::for_library("lib"),
            compress: true,
            large_threshold: 250,
            intents: 513,
            shard: [1, 4],
        };
        let encoded = serde_json::to_value(Command::identify(payload)).expect("encode");
        assert_eq!(encoded["op"], json!(2));
        assert_eq!(encoded["d"]["shard"], json!([1, 4]));
        assert_eq!(encoded["d"]["properties"]["browser"], json!("lib"));
        assert_eq!(encoded["d"]["properties"]["os"], json!(std::env::consts::OS));
        assert_eq!(encoded["d"]["compress"], json!(true));
    }

    #[test]
    fn resume_names_last_sequence_seq() {
        let command = Command::resume(ResumePayload {
            token: "t".into(),
            session_id: Some("abc".into()),
            seq: Some(42),
        });
        assert_eq!(
            serde_json::to_value(&command).expect("encode"),
            json!({"op": 6, "d": {"token": "t", "session_id": "abc", "seq": 42}})
        );
    }

    #[test]
    fn hello_interval_is_read_from_payload() {
        let envelope: Envelope =
            serde_json::from_value(json!({"op": 10, "d": {"heartbeat_interval": 41250}}))
                .expect("decode");
        assert_eq!(envelope.heartbeat_interval_ms(), Some(41_250));
        assert_eq!(envelope.s, None);
        assert_eq!(envelope.t, None);
    }

    #[rstest]
    #[case(json!({"heartbeat_interval": 41250.0}), Some(41_250))]
    #[case(json!({"heartbeat_interval": 41250.7}), Some(41_250))]
    #[case(json!({"heartbeat_interval": -1.0}), None)]
    #[case(json!({"heartbeat_interval": "41250"}), None)]
    #[case(json!({}), None)]
    #[case(json!(null), None)]
    fn hello_interval_accepts_only_non_negative_numbers(
        #[case] d: Value,
        #[case] expected: Option<u64>,
    ) {
        let envelope: Envelope =
            serde_json::from_value(json!({"op": 10, "d": d})).expect("decode");
        assert_eq!(envelope.heartbeat_interval_ms(), expected);
    }
}
