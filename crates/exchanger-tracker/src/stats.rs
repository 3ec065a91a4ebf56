//! Per-process counters exposed at `/stats` (spec §5: "stats counters are
//! per-process; no cross-process aggregation is part of the core").

use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Default, Serialize, Clone, Copy)]
pub struct TrackerStats {
    pub messages_received: u64,
    pub completions_published: u64,
    pub requeued_missing_task_id: u64,
    pub requeued_fetch_failed: u64,
    pub requeued_not_completed: u64,
    pub publish_failures: u64,
}

#[derive(Debug, Default)]
pub struct Stats {
    inner: Mutex<TrackerStats>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.inner.lock().unwrap().messages_received += 1;
    }

    pub fn record_completion_published(&self) {
        self.inner.lock().unwrap().completions_published += 1;
    }

    pub fn record_requeued_missing_task_id(&self) {
        self.inner.lock().unwrap().requeued_missing_task_id += 1;
    }

    pub fn record_requeued_fetch_failed(&self) {
        self.inner.lock().unwrap().requeued_fetch_failed += 1;
    }

    pub fn record_requeued_not_completed(&self) {
        self.inner.lock().unwrap().requeued_not_completed += 1;
    }

    pub fn record_publish_failure(&self) {
        self.inner.lock().unwrap().publish_failures += 1;
    }

    pub fn snapshot(&self) -> TrackerStats {
        *self.inner.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let stats = Stats::new();
        stats.record_received();
        stats.record_completion_published();
        stats.record_requeued_not_completed();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.completions_published, 1);
        assert_eq!(snapshot.requeued_not_completed, 1);
        assert_eq!(snapshot.requeued_missing_task_id, 0);
    }
}
