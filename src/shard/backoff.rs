//! Delay between failed connection attempts.

use std::time::Duration;

/// Back-off applied between failed connection attempts.
///
/// The delay starts at `initial_delay` and doubles per consecutive failure,
/// capped at `max_delay`. With both set to the same value the delay is fixed.
///
/// # Default Values
/// - `initial_delay`: 10 seconds
/// - `max_delay`: 10 seconds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectBackoff {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for the delay.
    pub max_delay: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self { Self::fixed(Duration::from_secs(10)) }
}

impl ReconnectBackoff {
    /// Back-off that always waits `delay`.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
        }
    }

    /// Clamp delays to sane bounds and ensure `initial_delay <= max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use shardwire::shard::ReconnectBackoff;
    ///
    /// let backoff = ReconnectBackoff {
    ///     initial_delay: Duration::from_secs(30),
    ///     max_delay: Duration::ZERO,
    /// }
    /// .normalized();
    /// assert_eq!(backoff.initial_delay, Duration::from_millis(1));
    /// assert_eq!(backoff.max_delay, Duration::from_secs(30));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay before retrying after `failures` consecutive failures.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(50)]
    fn default_is_fixed_ten_seconds(#[case] failures: u32) {
        assert_eq!(
            ReconnectBackoff::default().delay_for(failures),
            Duration::from_secs(10)
        );
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 4)]
    #[case(4, 8)]
    #[case(5, 10)]
    #[case(40, 10)]
    fn doubles_up_to_cap(#[case] failures: u32, #[case] secs: u64) {
        let backoff = ReconnectBackoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(backoff.delay_for(failures), Duration::from_secs(secs));
    }
}
