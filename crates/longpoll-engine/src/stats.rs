use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters for the delivery engine.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    polls: AtomicU64,
    immediate_polls: AtomicU64,
    held_polls: AtomicU64,
    poll_timeouts: AtomicU64,
    superseded_polls: AtomicU64,
    messages_delivered: AtomicU64,
    probes_injected: AtomicU64,
    lost_reports: AtomicU64,
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub polls: u64,
    pub immediate_polls: u64,
    pub held_polls: u64,
    pub poll_timeouts: u64,
    pub superseded_polls: u64,
    pub messages_delivered: u64,
    pub probes_injected: u64,
    pub lost_reports: u64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_poll(&self, held: bool) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        if held {
            self.held_polls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.immediate_polls.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_timeout(&self) {
        self.poll_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_superseded(&self) {
        self.superseded_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, count: usize) {
        self.messages_delivered
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_probe(&self) {
        self.probes_injected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lost(&self) {
        self.lost_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            immediate_polls: self.immediate_polls.load(Ordering::Relaxed),
            held_polls: self.held_polls.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            superseded_polls: self.superseded_polls.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            probes_injected: self.probes_injected.load(Ordering::Relaxed),
            lost_reports: self.lost_reports.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = DeliveryStats::new();
        stats.record_poll(true);
        stats.record_poll(false);
        stats.record_poll(false);
        stats.record_delivered(3);
        stats.record_timeout();
        stats.record_lost();

        let snap = stats.snapshot();
        assert_eq!(snap.polls, 3);
        assert_eq!(snap.held_polls, 1);
        assert_eq!(snap.immediate_polls, 2);
        assert_eq!(snap.messages_delivered, 3);
        assert_eq!(snap.poll_timeouts, 1);
        assert_eq!(snap.lost_reports, 1);
        assert_eq!(snap.probes_injected, 0);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(DeliveryStats::new().snapshot()).unwrap();
        assert_eq!(json["pollTimeouts"], 0);
        assert_eq!(json["messagesDelivered"], 0);
    }
}
