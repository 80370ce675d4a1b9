//! Fixed-window gate for outbound gateway commands.
//!
//! A [`RateLimiter`] hands out `capacity` permits per window. The first permit
//! taken in a window arms a one-shot reset timer; permits are only ever
//! restored by that timer. Callers arriving while no permits remain are
//! parked and released when the window resets, most recently parked first.
//!
//! Release order is last-in-first-out. Under sustained contention an early
//! waiter can be overtaken window after window.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::trace;
use tokio::sync::oneshot;

use crate::error::ConfigError;

/// Commands a shard may send per window.
pub const DEFAULT_CAPACITY: usize = 110;
/// Length of the shard's outbound window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct LimiterState {
    available: usize,
    waiters: Vec<oneshot::Sender<()>>,
    reset_scheduled: bool,
}

#[derive(Debug)]
struct LimiterInner {
    capacity: usize,
    window: Duration,
    state: Mutex<LimiterState>,
}

/// Fixed-capacity, periodically refilled permit gate.
///
/// Cloning yields another handle to the same gate.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use shardwire::ratelimit::RateLimiter;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let limiter = RateLimiter::new(2, Duration::from_secs(1)).expect("valid limiter");
/// limiter.acquire().await;
/// assert_eq!(limiter.available(), 1);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_parts(DEFAULT_CAPACITY, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    /// Create a gate allowing `capacity` permits every `window`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCapacity`] if `capacity` is zero and
    /// [`ConfigError::InvalidWindow`] if `window` is zero.
    pub fn new(capacity: usize, window: Duration) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if window.is_zero() {
            return Err(ConfigError::InvalidWindow);
        }
        Ok(Self::from_parts(capacity, window))
    }

    fn from_parts(capacity: usize, window: Duration) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                capacity,
                window,
                state: Mutex::new(LimiterState {
                    available: capacity,
                    waiters: Vec::new(),
                    reset_scheduled: false,
                }),
            }),
        }
    }

    /// Permits granted per window.
    #[must_use]
    pub fn capacity(&self) -> usize { self.inner.capacity }

    /// Length of one window.
    #[must_use]
    pub fn window(&self) -> Duration { self.inner.window }

    /// Permits left in the current window.
    #[must_use]
    pub fn available(&self) -> usize { self.inner.lock().available }

    /// Callers currently parked waiting for a permit.
    #[must_use]
    pub fn waiting(&self) -> usize { self.inner.lock().waiters.len() }

    /// Whether a reset timer is armed.
    #[must_use]
    pub fn reset_scheduled(&self) -> bool { self.inner.lock().reset_scheduled }

    /// Take one permit, waiting for the next reset while none remain.
    ///
    /// Must be called from within a Tokio runtime: the first permit of a
    /// window spawns the reset timer.
    pub async fn acquire(&self) {
        loop {
            let parked = {
                let mut state = self.inner.lock();
                if state.available > 0 {
                    state.available -= 1;
                    if !state.reset_scheduled {
                        state.reset_scheduled = true;
                        LimiterInner::schedule_reset(&self.inner);
                    }
                    return;
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                trace!("rate limiter exhausted: waiting={}", state.waiters.len());
                rx
            };
            // A closed channel only means the waiter list was dropped; retry.
            let _ = parked.await;
        }
    }
}

impl LimiterInner {
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_reset(this: &Arc<Self>) {
        let inner = Arc::clone(this);
        tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            inner.reset();
        });
    }

    fn reset(self: &Arc<Self>) {
        let mut state = self.lock();
        state.available = self.capacity;

        let mut released = 0;
        while released < self.capacity {
            let Some(waiter) = state.waiters.pop() else {
                break;
            };
            // Waiters whose acquire was dropped do not use up a release.
            if waiter.send(()).is_ok() {
                released += 1;
            }
        }
        trace!(
            "rate limiter reset: released={released}, waiting={}",
            state.waiters.len()
        );

        if state.waiters.is_empty() {
            state.reset_scheduled = false;
        } else {
            state.reset_scheduled = true;
            Self::schedule_reset(self);
        }
    }
}
