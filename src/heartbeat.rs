//! Heartbeat bookkeeping for one connection.
//!
//! [`HeartbeatMonitor`] holds the interval announced by Hello, the ack the
//! current cycle is waiting for and the handle of the most recent cycle task.
//! The shard drives the cycles; the monitor only records their state.

use std::time::Duration;

use tokio::{sync::oneshot, task::JoinHandle};

/// Time allowed for the gateway to acknowledge a heartbeat.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat state of a connected shard.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    interval: Option<Duration>,
    pending_ack: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Record the interval announced by Hello.
    pub fn set_interval(&mut self, interval: Duration) { self.interval = Some(interval); }

    #[must_use]
    pub fn interval(&self) -> Option<Duration> { self.interval }

    /// Delay before the next heartbeat, scaled by `jitter` on the first cycle
    /// after Hello. `jitter` is clamped to `[0, 1]`.
    ///
    /// Returns `None` until an interval is known.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use shardwire::heartbeat::HeartbeatMonitor;
    ///
    /// let mut monitor = HeartbeatMonitor::new();
    /// assert_eq!(monitor.cycle_delay(None), None);
    /// monitor.set_interval(Duration::from_millis(41_250));
    /// assert_eq!(monitor.cycle_delay(Some(0.5)), Some(Duration::from_millis(20_625)));
    /// assert_eq!(monitor.cycle_delay(None), Some(Duration::from_millis(41_250)));
    /// ```
    #[must_use]
    pub fn cycle_delay(&self, jitter: Option<f64>) -> Option<Duration> {
        let interval = self.interval?;
        Some(match jitter {
            Some(factor) => interval.mul_f64(factor.clamp(0.0, 1.0)),
            None => interval,
        })
    }

    /// Start waiting for an ack, replacing any earlier wait.
    pub fn arm(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.pending_ack = Some(tx);
        rx
    }

    /// Whether an ack is currently awaited.
    #[must_use]
    pub fn is_awaiting_ack(&self) -> bool { self.pending_ack.is_some() }

    /// Fulfil the pending ack.
    ///
    /// Returns `false` if no ack was awaited, in which case the caller must
    /// not start another cycle.
    pub fn acknowledge(&mut self) -> bool {
        match self.pending_ack.take() {
            Some(ack) => {
                // The cycle may already have timed out and dropped its receiver.
                let _ = ack.send(());
                true
            }
            None => false,
        }
    }

    /// Remember the task running the current cycle.
    ///
    /// An earlier cycle task is detached, not aborted.
    pub fn set_task(&mut self, task: JoinHandle<()>) { self.task = Some(task); }

    /// Whether a cycle task is recorded and still running.
    #[must_use]
    pub fn is_running(&self) -> bool { self.task.as_ref().is_some_and(|task| !task.is_finished()) }

    /// Abort the current cycle and forget all state.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.pending_ack = None;
        self.interval = None;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0.0, 0)]
    #[case(1.0, 41_250)]
    #[case(-3.0, 0)]
    #[case(7.0, 41_250)]
    fn jitter_is_clamped(#[case] factor: f64, #[case] millis: u64) {
        let mut monitor = HeartbeatMonitor::new();
        monitor.set_interval(Duration::from_millis(41_250));
        assert_eq!(
            monitor.cycle_delay(Some(factor)),
            Some(Duration::from_millis(millis))
        );
    }

    #[tokio::test]
    async fn acknowledge_fulfils_armed_wait_once() {
        let mut monitor = HeartbeatMonitor::new();
        let ack = monitor.arm();
        assert!(monitor.is_awaiting_ack());
        assert!(monitor.acknowledge());
        assert!(!monitor.acknowledge(), "second ack must be ignored");
        ack.await.expect("ack delivered");
    }

    #[test]
    fn ack_without_wait_is_ignored() {
        let mut monitor = HeartbeatMonitor::new();
        assert!(!monitor.acknowledge());
    }

    #[tokio::test]
    async fn stop_aborts_task_and_drops_wait() {
        let mut monitor = HeartbeatMonitor::new();
        monitor.set_interval(Duration::from_secs(1));
        let ack = monitor.arm();
        monitor.set_task(tokio::spawn(std::future::pending()));
        assert!(monitor.is_running());

        monitor.stop();
        assert!(!monitor.is_running());
        assert_eq!(monitor.interval(), None);
        assert!(ack.await.is_err(), "pending wait is cancelled");
    }
}
