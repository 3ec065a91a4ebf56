//! Process-local counters surfaced over the health endpoint, mirroring the
//! Worker's `Stats` (spec §5: stats are per-process, no cross-process
//! aggregation is part of the core).

use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskCreatorStats {
    pub messages_received: u64,
    pub tasks_created: u64,
    pub idempotent_skips: u64,
    pub fallback_creations: u64,
    pub validation_failures: u64,
    pub downstream_errors: u64,
    pub publish_retries: u64,
    pub publish_failures: u64,
    pub sync_failures: u64,
}

#[derive(Debug, Default)]
pub struct Stats(Mutex<TaskCreatorStats>);

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TaskCreatorStats {
        self.0.lock().expect("stats mutex poisoned").clone()
    }

    pub fn record_received(&self) {
        self.0.lock().expect("stats mutex poisoned").messages_received += 1;
    }

    pub fn record_created(&self) {
        self.0.lock().expect("stats mutex poisoned").tasks_created += 1;
    }

    pub fn record_idempotent_skip(&self) {
        self.0.lock().expect("stats mutex poisoned").idempotent_skips += 1;
    }

    pub fn record_fallback_creation(&self) {
        self.0.lock().expect("stats mutex poisoned").fallback_creations += 1;
    }

    pub fn record_validation_failure(&self) {
        self.0.lock().expect("stats mutex poisoned").validation_failures += 1;
    }

    pub fn record_downstream_error(&self) {
        self.0.lock().expect("stats mutex poisoned").downstream_errors += 1;
    }

    pub fn record_publish_retry(&self) {
        self.0.lock().expect("stats mutex poisoned").publish_retries += 1;
    }

    pub fn record_publish_failure(&self) {
        self.0.lock().expect("stats mutex poisoned").publish_failures += 1;
    }

    pub fn record_sync_failure(&self) {
        self.0.lock().expect("stats mutex poisoned").sync_failures += 1;
    }
}
