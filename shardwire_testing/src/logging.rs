//! Exclusive access to the global log capture.
//!
//! The shard logs through `tracing` with its `log` bridge enabled, so
//! records reach [`logtest::Logger`] even when a subscriber is installed.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use logtest::Logger;
use rstest::fixture;

/// Guard over the global [`Logger`].
///
/// Holding the guard keeps other tests from draining records this test
/// expects to see.
pub struct LoggerHandle {
    guard: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Acquire the global logger, discarding records left by earlier tests.
    #[must_use]
    pub fn new() -> Self {
        static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

        let logger = LOGGER.get_or_init(|| Mutex::new(Logger::start()));
        let mut guard = logger.lock().unwrap_or_else(PoisonError::into_inner);
        while guard.pop().is_some() {}

        Self { guard }
    }

    /// Whether any captured record at `level` contains `needle`.
    pub fn contains(&mut self, level: log::Level, needle: &str) -> bool {
        let mut found = false;
        while let Some(record) = self.guard.pop() {
            found |= record.level() == level && record.args().contains(needle);
        }
        found
    }
}

impl Default for LoggerHandle {
    fn default() -> Self { Self::new() }
}

impl std::ops::Deref for LoggerHandle {
    type Target = Logger;

    fn deref(&self) -> &Self::Target { &self.guard }
}

impl std::ops::DerefMut for LoggerHandle {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.guard }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::new() }
