//! Connecting, reconnecting, heartbeating and closing.

use std::sync::atomic::Ordering;

use futures::future::BoxFuture;
use tokio::{sync::oneshot, time};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use super::{
    Shard,
    ShardState,
    close_policy::Recovery,
    lock,
    receive,
    tracing_helpers::{close_span, connect_span, emit_timing_event, heartbeat_span, timer},
};
use crate::{
    error::{Result, ShardError},
    metrics,
    protocol::{CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, gateway_url},
    transport::{Connection, TransportError},
};

/// Why the wait for Hello ended without one.
enum HelloWait {
    /// The connection ended first.
    Closed,
    TimedOut,
}

impl Shard {
    /// Open a new session and identify.
    ///
    /// Connection failures are retried with the configured back-off. The call
    /// returns once Hello has been received and Identify has been sent.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::AlreadyConnected`] if the shard has a transport,
    /// [`ShardError::HelloTimeout`] if a hello timeout is configured and
    /// expires, [`ShardError::Closed`] if [`close`](Self::close) is called
    /// before the handshake finishes, and transport errors that are not
    /// worth retrying.
    pub async fn connect(&self) -> Result<()> { self.connect_with(false).await }

    /// Connect, resuming the recorded session when `resume` is true.
    ///
    /// The resume host announced by the last ready event is used when
    /// resuming and one is known; the configured gateway otherwise.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_with(&self, resume: bool) -> Result<()> {
        self.inner.stopped.store(false, Ordering::Release);
        self.inner.failure.send_replace(None);
        self.establish(resume).await
    }

    /// Close the connection with code 1000 and stay disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::NotConnected`] if there is no transport.
    pub async fn close(&self) -> Result<()> {
        let span = close_span(&self.inner.config.tracing, self.inner.config.shard.index);
        let start = timer(self.inner.config.tracing.close_timing);
        let result = async {
            self.inner.stopped.store(true, Ordering::Release);
            if self.inner.sink.lock().await.is_none() {
                return Err(ShardError::NotConnected);
            }
            self.set_state(ShardState::Closing);
            self.teardown(Some(CLOSE_NORMAL)).await;
            info!("shard closed");
            Ok(())
        }
        .instrument(span)
        .await;
        emit_timing_event(start);
        result
    }

    /// Reconnect in the background path.
    ///
    /// Boxed so the receive loop and heartbeat tasks can reconnect without
    /// the connect future containing itself.
    pub(crate) fn reconnect(&self, resume: bool) -> BoxFuture<'static, Result<()>> {
        let shard = self.clone();
        Box::pin(async move {
            if shard.is_stopped() {
                debug!("shard closed locally; not reconnecting");
                return Ok(());
            }
            metrics::inc_reconnects(resume);
            info!(resume, "reconnecting");
            shard.establish(resume).await
        })
    }

    async fn establish(&self, resume: bool) -> Result<()> {
        let claimed = self.inner.state.send_if_modified(|state| {
            if *state == ShardState::Disconnected {
                *state = ShardState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(ShardError::AlreadyConnected);
        }

        let span = connect_span(&self.inner.config.tracing, self.inner.config.shard.index, resume);
        let start = timer(self.inner.config.tracing.connect_timing);
        let result = self.handshake(resume).instrument(span).await;
        emit_timing_event(start);
        match &result {
            Ok(()) => {}
            // The connection was already torn down by a concurrent close.
            Err(ShardError::NotConnected) => warn!("connection lost during handshake"),
            Err(ShardError::Closed) => {
                debug!("shard closed while connecting");
                self.teardown(None).await;
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                self.teardown(None).await;
            }
        }
        result
    }

    fn handshake_url(&self, resume: bool) -> String {
        let config = &self.inner.config;
        let resume_url = if resume { self.resume_url() } else { None };
        let base = resume_url.as_deref().unwrap_or(&config.gateway_base);
        gateway_url(base, config.version)
    }

    async fn handshake(&self, resume: bool) -> Result<()> {
        let config = &self.inner.config;
        let mut failures = 0u32;
        loop {
            if failures > 0 {
                let delay = config.backoff.delay_for(failures);
                debug!(failures, ?delay, "retrying connection");
                time::sleep(delay).await;
            }
            if self.is_stopped() {
                return Err(ShardError::Closed);
            }

            lock(&self.inner.inflater).reset();
            let url = self.handshake_url(resume);
            tracing::Span::current().record("url", url.as_str());
            let connection = match self.inner.connector.connect(&url, config.proxy.clone()).await {
                Ok(connection) => connection,
                Err(e @ TransportError::Connect { .. }) => {
                    warn!(error = %e, "connection attempt failed");
                    failures = failures.saturating_add(1);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if self.is_stopped() {
                return Err(ShardError::Closed);
            }

            let hello = self.open(connection).await;
            self.set_state(ShardState::AwaitingHello);
            match self.await_hello(hello).await {
                Ok(()) => break,
                Err(HelloWait::TimedOut) => return Err(ShardError::HelloTimeout),
                Err(HelloWait::Closed) if self.is_stopped() => return Err(ShardError::Closed),
                Err(HelloWait::Closed) => {
                    warn!("connection closed before hello");
                    self.teardown(None).await;
                    self.set_state(ShardState::Connecting);
                    failures = failures.saturating_add(1);
                }
            }
        }

        if resume {
            self.set_state(ShardState::Resuming);
            self.resume().await?;
        } else {
            self.set_state(ShardState::Identifying);
            lock(&self.inner.session).reset_for_new_session();
            self.identify().await?;
        }
        self.set_state(ShardState::Steady);
        info!("shard connected");
        Ok(())
    }

    /// Install a new connection and start its receive loop.
    async fn open(&self, connection: Connection) -> oneshot::Receiver<()> {
        let Connection { sink, source } = connection;
        let (hello_tx, hello_rx) = oneshot::channel();
        *lock(&self.inner.hello) = Some(hello_tx);
        *self.inner.sink.lock().await = Some(sink);

        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.inner.receiver).replace(token.clone()) {
            previous.cancel();
        }
        tokio::spawn(receive::run(self.clone(), source, token).in_current_span());
        hello_rx
    }

    async fn await_hello(&self, hello: oneshot::Receiver<()>) -> std::result::Result<(), HelloWait> {
        match self.inner.config.hello_timeout {
            None => hello.await.map_err(|_| HelloWait::Closed),
            Some(limit) => match time::timeout(limit, hello).await {
                Ok(received) => received.map_err(|_| HelloWait::Closed),
                Err(_) => Err(HelloWait::TimedOut),
            },
        }
    }

    /// Signal the connect call waiting for Hello.
    pub(super) fn hello_received(&self) {
        if let Some(hello) = lock(&self.inner.hello).take() {
            let _ = hello.send(());
        }
    }

    /// Fail the connect call waiting for Hello.
    pub(super) fn abandon_hello(&self) { lock(&self.inner.hello).take(); }

    /// Stop the receive loop and heartbeat, fail any pending Hello wait and
    /// drop the transport, sending a close frame with `close_code` if one is
    /// given.
    pub(super) async fn teardown(&self, close_code: Option<u16>) {
        if let Some(token) = lock(&self.inner.receiver).take() {
            token.cancel();
        }
        // A cancelled loop never reports Hello.
        self.abandon_hello();
        lock(&self.inner.heartbeat).stop();
        let sink = self.inner.sink.lock().await.take();
        if let (Some(mut sink), Some(code)) = (sink, close_code) {
            if !sink.is_closed() {
                if let Err(e) = sink.close(code).await {
                    debug!(code, error = %e, "close frame not sent");
                }
            }
        }
        self.set_state(ShardState::Disconnected);
    }

    /// Recover from a connection the gateway closed.
    pub(super) async fn handle_close(&self, code: Option<u16>) -> Result<()> {
        lock(&self.inner.heartbeat).stop();
        let recovery = self.inner.config.close_policy.decide(code);
        info!(?code, ?recovery, "gateway closed the connection");
        match recovery {
            Recovery::Resume => self.reconnect(true).await,
            Recovery::Fresh => self.reconnect(false).await,
            Recovery::Fatal => {
                let code = code.unwrap_or_default();
                self.inner.failure.send_replace(Some(code));
                Err(ShardError::UnrecoverableSession { code })
            }
        }
    }

    /// Spawn the next heartbeat cycle; `first` applies the initial jitter.
    pub(super) fn start_heartbeat(&self, first: bool) {
        let span = heartbeat_span(&self.inner.config.tracing, self.inner.config.shard.index);
        let task = tokio::spawn(self.clone().heartbeat_cycle(first).instrument(span));
        lock(&self.inner.heartbeat).set_task(task);
    }

    async fn heartbeat_cycle(self, first: bool) {
        let jitter = first.then(rand::random::<f64>);
        let Some(delay) = lock(&self.inner.heartbeat).cycle_delay(jitter) else {
            return;
        };
        time::sleep(delay).await;

        let ack = lock(&self.inner.heartbeat).arm();
        match self.send_heartbeat().await {
            Ok(()) => {}
            Err(e) if e.is_connection_reset() => {
                warn!("heartbeat hit a reset connection");
                self.spawn_zombie_recovery();
                return;
            }
            Err(e) => {
                debug!(error = %e, "heartbeat not sent");
                return;
            }
        }

        match time::timeout(self.inner.config.ack_timeout, ack).await {
            Ok(Ok(())) => debug!("heartbeat acknowledged"),
            // Monitor stopped or re-armed.
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("heartbeat ack timed out");
                metrics::inc_heartbeat_timeouts();
                self.spawn_zombie_recovery();
            }
        }
    }

    /// Abandon an unresponsive connection and reconnect.
    ///
    /// Runs on its own task: the teardown aborts the heartbeat task that
    /// noticed the problem.
    fn spawn_zombie_recovery(&self) {
        let shard = self.clone();
        tokio::spawn(
            async move {
                shard.teardown(Some(CLOSE_POLICY_VIOLATION)).await;
                let resume = shard.resume_url().is_some();
                if let Err(e) = shard.reconnect(resume).await {
                    warn!(error = %e, "reconnect after zombie connection failed");
                }
            }
            .in_current_span(),
        );
    }
}
