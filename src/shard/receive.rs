//! The per-connection receive loop.
//!
//! One loop runs per connection. It reads frames in arrival order, inflates
//! and decodes them, records sequence numbers and routes each envelope by
//! opcode. When the gateway ends the connection the loop hands the close
//! code to [`Shard::handle_close`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, trace, warn};

use super::{
    Shard,
    lock,
    tracing_helpers::{dispatch_span, emit_timing_event, timer},
};
use crate::{
    codec,
    metrics::{self, Direction, DiscardReason},
    protocol::{CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR, Envelope, OpCode, READY_EVENT},
    transport::{FrameSource, InboundFrame},
};

/// Whether the loop keeps reading after an envelope.
enum Flow {
    Continue,
    /// The connection was replaced; this loop instance must end.
    Stop,
}

pub(super) async fn run(shard: Shard, mut source: Box<dyn FrameSource>, token: CancellationToken) {
    let mut close_code = None;
    let mut hello_seen = false;
    loop {
        let frame = tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!("receive loop cancelled");
                return;
            }
            frame = source.next_frame() => frame,
        };
        match frame {
            None => break,
            Some(Err(e)) => {
                debug!(error = %e, "transport error ended the connection");
                break;
            }
            Some(Ok(InboundFrame::Close(code))) => {
                close_code = code;
                break;
            }
            Some(Ok(InboundFrame::Text(text))) => {
                trace!(len = text.len(), "ignoring text frame");
                metrics::inc_discarded(DiscardReason::Text);
            }
            Some(Ok(InboundFrame::Binary(bytes))) => {
                metrics::inc_frames(Direction::Inbound);
                let Some(envelope) = shard.decode_frame(&bytes) else {
                    continue;
                };
                hello_seen |= envelope.op == OpCode::Hello.code();
                if let Flow::Stop = shard.route(envelope).await {
                    return;
                }
            }
        }
    }

    if token.is_cancelled() {
        return;
    }
    if !hello_seen {
        // The pending connect call retries the connection.
        shard.abandon_hello();
        return;
    }
    debug!(?close_code, "connection ended");
    shard.teardown(None).await;
    if let Err(e) = shard.handle_close(close_code).await {
        warn!(error = %e, "shard stopped");
    }
}

impl Shard {
    /// Inflate and decode one binary frame, or `None` if it must be skipped.
    fn decode_frame(&self, bytes: &[u8]) -> Option<Envelope> {
        let inflated = match lock(&self.inner.inflater).push(bytes) {
            Ok(Some(inflated)) => inflated,
            Ok(None) => {
                metrics::inc_discarded(DiscardReason::Incomplete);
                return None;
            }
            Err(e) => {
                debug!(error = %e, "discarding undecompressable frame");
                metrics::inc_discarded(DiscardReason::Decompress);
                return None;
            }
        };
        match codec::decode(&inflated) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                debug!(error = %e, "discarding undecodable frame");
                metrics::inc_discarded(DiscardReason::Decode);
                None
            }
        }
    }

    async fn route(&self, envelope: Envelope) -> Flow {
        lock(&self.inner.session).observe_sequence(envelope.s);
        let op = match envelope.opcode() {
            Ok(op) => op,
            Err(raw) => {
                debug!(op = raw, "ignoring unknown opcode");
                return Flow::Continue;
            }
        };
        trace!(?op, seq = ?envelope.s, "routing envelope");

        match op {
            OpCode::Dispatch => self.dispatch(envelope),
            OpCode::Heartbeat => {
                if let Err(e) = self.send_heartbeat().await {
                    warn!(error = %e, "requested heartbeat not sent");
                }
            }
            OpCode::Reconnect => {
                self.teardown(Some(CLOSE_PROTOCOL_ERROR)).await;
                if let Err(e) = self.reconnect(true).await {
                    warn!(error = %e, "reconnect requested by gateway failed");
                }
                return Flow::Stop;
            }
            OpCode::InvalidSession => {
                self.teardown(Some(CLOSE_NORMAL)).await;
                if let Err(e) = self.reconnect(false).await {
                    warn!(error = %e, "reconnect after invalid session failed");
                }
                return Flow::Stop;
            }
            OpCode::Hello => match envelope.heartbeat_interval_ms() {
                Some(millis) => {
                    lock(&self.inner.heartbeat).set_interval(Duration::from_millis(millis));
                    self.start_heartbeat(true);
                    self.hello_received();
                }
                None => {
                    warn!("hello without heartbeat interval");
                    // The pending connect call retries the connection.
                    self.abandon_hello();
                }
            },
            OpCode::HeartbeatAck => {
                let acknowledged = lock(&self.inner.heartbeat).acknowledge();
                if acknowledged {
                    self.start_heartbeat(false);
                } else {
                    debug!("ignoring unexpected heartbeat ack");
                }
            }
            OpCode::Identify | OpCode::Resume => {
                debug!(?op, "ignoring client-only opcode");
            }
        }
        Flow::Continue
    }

    /// Hand a dispatch to the dispatcher without waiting for its handlers.
    fn dispatch(&self, envelope: Envelope) {
        let Envelope { d, t, .. } = envelope;
        let Some(event) = t else {
            debug!("dispatch without event type");
            return;
        };
        if event == READY_EVENT {
            lock(&self.inner.session).record_ready(&d);
        }

        let dispatcher = std::sync::Arc::clone(&self.inner.dispatcher);
        let span = dispatch_span(&self.inner.config.tracing, &event);
        let start = timer(self.inner.config.tracing.dispatch_timing);
        tokio::spawn(
            async move {
                if let Err(e) = dispatcher.call(&event, d).await {
                    metrics::inc_dispatch_failures();
                    warn!(error = %e, "dispatch failed");
                }
                emit_timing_event(start);
            }
            .instrument(span),
        );
    }
}
