//! The gateway connection state machine.
//!
//! A [`Shard`] owns one gateway session: it opens the transport, waits for
//! Hello, identifies or resumes, keeps the connection alive with heartbeats
//! and routes inbound frames until the connection ends. Recoverable closes
//! lead to a new connection in the background; unrecoverable ones are
//! reported through [`Shard::failure`].
//!
//! `Shard` is a cheap handle: clones share the same connection.

use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::{Mutex as AsyncMutex, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    codec,
    dispatch::Dispatcher,
    error::{Result, ShardError},
    heartbeat::HeartbeatMonitor,
    inflate::Inflater,
    metrics::{self, Direction},
    protocol::Command,
    ratelimit::RateLimiter,
    session::{SessionState, ShardInfo},
    transport::{Connector, FrameSink},
};

mod backoff;
mod builder;
mod close_policy;
mod config;
mod lifecycle;
mod receive;
mod state;
mod tracing_config;
mod tracing_helpers;

pub use backoff::ReconnectBackoff;
pub use builder::ShardBuilder;
pub use close_policy::{CloseCodePolicy, Recovery};
pub use config::{
    DEFAULT_GATEWAY,
    DEFAULT_LARGE_THRESHOLD,
    DEFAULT_LIBRARY,
    DEFAULT_VERSION,
    ShardConfig,
};
pub use state::ShardState;
pub use tracing_config::TracingConfig;
use tracing_helpers::{emit_timing_event, send_span, timer};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ShardInner {
    config: ShardConfig,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<Dispatcher>,
    limiter: RateLimiter,
    sink: AsyncMutex<Option<Box<dyn FrameSink>>>,
    session: Mutex<SessionState>,
    inflater: Mutex<Inflater>,
    heartbeat: Mutex<HeartbeatMonitor>,
    hello: Mutex<Option<oneshot::Sender<()>>>,
    receiver: Mutex<Option<CancellationToken>>,
    state: watch::Sender<ShardState>,
    failure: watch::Sender<Option<u16>>,
    stopped: AtomicBool,
}

/// Handle to one gateway shard.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use shardwire::{Dispatcher, Handler, Shard};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dispatcher = Arc::new(Dispatcher::new());
/// dispatcher.add_call(
///     "MESSAGE_CREATE",
///     Handler::new(|payload| async move {
///         println!("{}", *payload);
///         Ok(())
///     }),
/// );
/// let shard = Shard::builder("token")
///     .intents(1 << 9)
///     .dispatcher(dispatcher)
///     .build()?;
/// shard.connect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Shard {
    inner: Arc<ShardInner>,
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("shard", &self.inner.config.shard)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Shard {
    /// Start configuring a shard authenticated by `token`.
    pub fn builder(token: impl Into<String>) -> ShardBuilder { ShardBuilder::new(token) }

    pub(crate) fn from_parts(
        config: ShardConfig,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<Dispatcher>,
        limiter: RateLimiter,
    ) -> Self {
        let session = SessionState::new(config.shard);
        let inflater = Inflater::new(config.frame_assembly);
        Self {
            inner: Arc::new(ShardInner {
                config,
                connector,
                dispatcher,
                limiter,
                sink: AsyncMutex::new(None),
                session: Mutex::new(session),
                inflater: Mutex::new(inflater),
                heartbeat: Mutex::new(HeartbeatMonitor::new()),
                hello: Mutex::new(None),
                receiver: Mutex::new(None),
                state: watch::Sender::new(ShardState::Disconnected),
                failure: watch::Sender::new(None),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ShardConfig { &self.inner.config }

    /// Dispatcher receiving this shard's events.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> { &self.inner.dispatcher }

    /// Outbound command gate.
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter { &self.inner.limiter }

    #[must_use]
    pub fn shard_info(&self) -> ShardInfo { self.inner.config.shard }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ShardState { *self.inner.state.borrow() }

    /// Subscribe to lifecycle state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ShardState> { self.inner.state.subscribe() }

    /// Snapshot of the session bookkeeping.
    #[must_use]
    pub fn session(&self) -> SessionState { lock(&self.inner.session).clone() }

    /// Session id from the last ready event.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        lock(&self.inner.session).session_id().map(str::to_owned)
    }

    /// Resume host from the last ready event.
    #[must_use]
    pub fn resume_url(&self) -> Option<String> {
        lock(&self.inner.session).resume_url().map(str::to_owned)
    }

    /// Last sequence number observed.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> { lock(&self.inner.session).sequence() }

    /// Wait until the shard stops because of an unrecoverable close.
    ///
    /// Background reconnects cannot return errors to a caller; this is where
    /// a fatal close code is surfaced.
    pub async fn failure(&self) -> ShardError {
        let mut failure = self.inner.failure.subscribe();
        match failure.wait_for(Option::is_some).await {
            Ok(code) => ShardError::UnrecoverableSession {
                code: code.unwrap_or_default(),
            },
            // The sender lives as long as `self`.
            Err(_) => ShardError::NotConnected,
        }
    }

    /// Send one command through the rate limiter.
    ///
    /// This is the only outbound path: heartbeats, identify and resume all
    /// go through it.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::NotConnected`] if there is no transport, and
    /// the codec or transport error if encoding or writing fails.
    pub async fn send(&self, command: &Command) -> Result<()> {
        let span = send_span(&self.inner.config.tracing, command.op);
        let start = timer(self.inner.config.tracing.send_timing);
        let result = async {
            if self.inner.sink.lock().await.is_none() {
                return Err(ShardError::NotConnected);
            }
            self.inner.limiter.acquire().await;
            let bytes = codec::encode(command)?;
            tracing::Span::current().record("frame.bytes", bytes.len());
            let mut sink = self.inner.sink.lock().await;
            let sink = sink.as_mut().ok_or(ShardError::NotConnected)?;
            sink.send_bytes(bytes).await?;
            metrics::inc_frames(Direction::Outbound);
            Ok(())
        }
        .instrument(span)
        .await;
        emit_timing_event(start);
        result
    }

    /// Send Identify for a new session.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn identify(&self) -> Result<()> {
        let payload = self.inner.config.identify_payload();
        self.send(&Command::identify(payload)).await
    }

    /// Send Resume with the recorded session id and sequence.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn resume(&self) -> Result<()> {
        let payload = {
            let session = lock(&self.inner.session);
            self.inner.config.resume_payload(&session)
        };
        self.send(&Command::resume(payload)).await
    }

    /// Send a heartbeat carrying the last sequence seen.
    pub(crate) async fn send_heartbeat(&self) -> Result<()> {
        self.send(&Command::heartbeat(self.sequence())).await
    }

    fn set_state(&self, next: ShardState) {
        let previous = self.inner.state.send_replace(next);
        if previous != ShardState::Steady && next == ShardState::Steady {
            metrics::inc_active_shards();
        } else if previous == ShardState::Steady && next != ShardState::Steady {
            metrics::dec_active_shards();
        }
    }

    fn is_stopped(&self) -> bool { self.inner.stopped.load(Ordering::Acquire) }
}

#[cfg(test)]
mod tests;
