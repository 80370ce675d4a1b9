//! Reading metrics recorded through a
//! [`DebuggingRecorder`](metrics_util::debugging::DebuggingRecorder).

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

/// Create a debugging recorder and its snapshotter.
#[must_use]
pub fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn matches_key(
    key: &metrics_util::CompositeKey,
    name: &str,
    labels: &[(&str, &str)],
) -> bool {
    key.key().name() == name
        && labels.iter().all(|(k, v)| {
            key.key()
                .labels()
                .any(|l| l.key() == *k && l.value() == *v)
        })
}

/// Sum of every counter named `name` carrying all of `labels`.
#[must_use]
pub fn counter_value(snapshotter: &Snapshotter, name: &str, labels: &[(&str, &str)]) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, ..)| matches_key(key, name, labels))
        .map(|(.., value)| match value {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

/// Value of the gauge named `name`, if recorded.
#[must_use]
pub fn gauge_value(snapshotter: &Snapshotter, name: &str) -> Option<f64> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(key, ..)| matches_key(key, name, &[]))
        .and_then(|(.., value)| match value {
            DebugValue::Gauge(g) => Some(g.into_inner()),
            _ => None,
        })
}
