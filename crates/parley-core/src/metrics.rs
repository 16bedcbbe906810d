//! Pipeline counters.
//!
//! Lock-free [`AtomicU64`] counters bumped by the coordinator, readable at
//! any time as a serializable [`MetricsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident),+ $(,)?) => {
        /// Live counters shared by the pipeline.
        #[derive(Debug, Default)]
        pub struct PipelineMetrics {
            $($(#[$doc])* pub(crate) $name: AtomicU64,)+
        }

        /// Point-in-time copy of [`PipelineMetrics`].
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct MetricsSnapshot {
            $($(#[$doc])* pub $name: u64,)+
        }

        impl PipelineMetrics {
            $(
                $(#[$doc])*
                pub fn $name(&self) -> u64 {
                    self.$name.load(Ordering::Relaxed)
                }
            )+

            /// Copy every counter.
            pub fn snapshot(&self) -> MetricsSnapshot {
                MetricsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)+
                }
            }
        }
    };
}

counters! {
    /// Inbound messages delivered by adapters.
    received,
    /// Messages dropped by the access check.
    access_denied,
    /// Aggregated messages released by the debouncer.
    debounce_flushes,
    /// Engine calls started.
    dispatched,
    /// Replies whose every fragment was delivered.
    responded,
    /// Dispatches that ended in the failure path.
    failed,
    /// Engine calls that hit their deadline.
    engine_timeouts,
    /// Attachments dropped during resolution.
    attachment_failures,
    /// Fragment sends retried after a first failure.
    send_retries,
    /// Fragment sends that failed after their retry.
    send_failures,
    /// Fragments sent successfully.
    fragments_sent,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        Self::bump_by(counter, 1);
    }

    pub(crate) fn bump_by(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(PipelineMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn bump_and_snapshot() {
        let m = PipelineMetrics::new();
        PipelineMetrics::bump(&m.received);
        PipelineMetrics::bump(&m.received);
        PipelineMetrics::bump_by(&m.fragments_sent, 3);

        assert_eq!(m.received(), 2);
        let snap = m.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.fragments_sent, 3);
        assert_eq!(snap.failed, 0);
    }

    #[test]
    fn snapshot_serializes_flat() {
        let m = PipelineMetrics::new();
        PipelineMetrics::bump(&m.access_denied);
        let json = serde_json::to_value(m.snapshot()).unwrap();
        assert_eq!(json["access_denied"], 1);
        assert_eq!(json["send_retries"], 0);
    }
}
