//! Session bookkeeping owned by a shard.
//!
//! [`SessionState`] tracks what a resume attempt needs: the session id and
//! resume host announced by the ready event, and the last sequence number
//! observed on the current session.

use log::warn;
use serde_json::Value;

/// Shard index and shard count reported when identifying.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShardInfo {
    /// Zero-based index of this shard.
    pub index: u32,
    /// Total number of shards; `0` when sharding is not in use.
    pub count: u32,
}

impl ShardInfo {
    /// Create a new [`ShardInfo`].
    #[must_use]
    pub const fn new(index: u32, count: u32) -> Self { Self { index, count } }

    /// The `[index, count]` pair sent with identify.
    #[must_use]
    pub const fn as_pair(self) -> [u32; 2] { [self.index, self.count] }
}

/// Resumable state of one gateway session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    session_id: Option<String>,
    resume_url: Option<String>,
    sequence: Option<u64>,
    shard: ShardInfo,
}

impl SessionState {
    /// Empty session for `shard`.
    #[must_use]
    pub fn new(shard: ShardInfo) -> Self {
        Self {
            shard,
            ..Self::default()
        }
    }

    /// Session id announced by the last ready event.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> { self.session_id.as_deref() }

    /// Resume host announced by the last ready event.
    #[must_use]
    pub fn resume_url(&self) -> Option<&str> { self.resume_url.as_deref() }

    /// Last sequence number observed.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> { self.sequence }

    #[must_use]
    pub fn shard(&self) -> ShardInfo { self.shard }

    /// Whether a resume command can be built from this state.
    #[must_use]
    pub fn can_resume(&self) -> bool { self.session_id.is_some() }

    /// Record the sequence number carried by an inbound envelope.
    ///
    /// Absent sequences leave the state untouched. A sequence lower than the
    /// one already recorded is ignored so the value never moves backwards
    /// within a session. Returns `true` if the stored sequence changed.
    pub fn observe_sequence(&mut self, sequence: Option<u64>) -> bool {
        let Some(next) = sequence else {
            return false;
        };
        match self.sequence {
            Some(current) if next < current => {
                warn!("ignoring out-of-order sequence: current={current}, received={next}");
                false
            }
            Some(current) if next == current => false,
            _ => {
                self.sequence = Some(next);
                true
            }
        }
    }

    /// Capture the session id and resume host from a ready payload.
    ///
    /// Missing fields leave the previous values in place.
    pub fn record_ready(&mut self, payload: &Value) {
        if let Some(id) = payload.get("session_id").and_then(Value::as_str) {
            self.session_id = Some(id.to_owned());
        }
        if let Some(url) = payload.get("resume_gateway_url").and_then(Value::as_str) {
            self.resume_url = Some(url.to_owned());
        }
    }

    /// Forget the previous session before identifying afresh.
    ///
    /// The resume host is kept: the next resume-reconnect will learn a new
    /// one from the next ready event anyway.
    pub fn reset_for_new_session(&mut self) {
        self.session_id = None;
        self.sequence = None;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn ready_payload_populates_resume_fields() {
        let mut state = SessionState::new(ShardInfo::new(1, 2));
        assert!(!state.can_resume());
        state.record_ready(&json!({"session_id": "abc", "resume_gateway_url": "wss://x"}));
        assert_eq!(state.session_id(), Some("abc"));
        assert_eq!(state.resume_url(), Some("wss://x"));
        assert!(state.can_resume());
        assert_eq!(state.shard().as_pair(), [1, 2]);
    }

    #[rstest]
    #[case(None, None)]
    #[case(Some(3), Some(3))]
    fn absent_sequence_keeps_previous(#[case] first: Option<u64>, #[case] expected: Option<u64>) {
        let mut state = SessionState::default();
        state.observe_sequence(first);
        assert!(!state.observe_sequence(None));
        assert_eq!(state.sequence(), expected);
    }

    #[test]
    fn lower_sequence_is_ignored() {
        let mut state = SessionState::default();
        assert!(state.observe_sequence(Some(10)));
        assert!(!state.observe_sequence(Some(4)));
        assert_eq!(state.sequence(), Some(10));
    }

    #[test]
    fn new_session_clears_id_and_sequence() {
        let mut state = SessionState::default();
        state.record_ready(&json!({"session_id": "abc", "resume_gateway_url": "wss://x"}));
        state.observe_sequence(Some(9));
        state.reset_for_new_session();
        assert_eq!(state.session_id(), None);
        assert_eq!(state.sequence(), None);
        assert_eq!(state.resume_url(), Some("wss://x"));
    }

    proptest! {
        #[test]
        fn sequence_tracks_last_present_value(
            frames in proptest::collection::vec(proptest::option::of(0u64..1_000), 0..64)
        ) {
            // Gateways number dispatches in increasing order.
            let mut sorted: Vec<u64> = frames.iter().flatten().copied().collect();
            sorted.sort_unstable();
            let mut present = sorted.into_iter();
            let ordered: Vec<Option<u64>> = frames
                .iter()
                .map(|f| f.and_then(|_| present.next()))
                .collect();

            let mut state = SessionState::default();
            let mut previous = None;
            for frame in &ordered {
                state.observe_sequence(*frame);
                prop_assert!(state.sequence() >= previous);
                previous = state.sequence();
            }
            let last = ordered.iter().rev().find_map(|f| *f);
            prop_assert_eq!(state.sequence(), last);
        }

        #[test]
        fn sequence_never_decreases(
            frames in proptest::collection::vec(proptest::option::of(any::<u64>()), 0..64)
        ) {
            let mut state = SessionState::default();
            let mut previous = None;
            for frame in frames {
                state.observe_sequence(frame);
                prop_assert!(state.sequence() >= previous);
                previous = state.sequence();
            }
        }
    }
}
