//! Process-local counters surfaced over the health endpoint (spec §5:
//! "Stats counters are per-process; no cross-process aggregation is part
//! of the core").

use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub tasks_fetched: u64,
    pub tasks_published: u64,
    pub publish_failures: u64,
    pub responses_processed: u64,
    pub completions_ok: u64,
    pub completions_already_gone: u64,
    pub completions_failed: u64,
    pub consecutive_errors: u32,
}

#[derive(Debug, Default)]
pub struct Stats(Mutex<WorkerStats>);

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WorkerStats {
        self.0.lock().expect("stats mutex poisoned").clone()
    }

    pub fn record_fetched(&self, count: u64) {
        self.0.lock().expect("stats mutex poisoned").tasks_fetched += count;
    }

    pub fn record_published(&self) {
        self.0.lock().expect("stats mutex poisoned").tasks_published += 1;
    }

    pub fn record_publish_failure(&self) {
        self.0.lock().expect("stats mutex poisoned").publish_failures += 1;
    }

    pub fn record_completion_ok(&self) {
        let mut guard = self.0.lock().expect("stats mutex poisoned");
        guard.responses_processed += 1;
        guard.completions_ok += 1;
    }

    pub fn record_completion_already_gone(&self) {
        let mut guard = self.0.lock().expect("stats mutex poisoned");
        guard.responses_processed += 1;
        guard.completions_already_gone += 1;
    }

    pub fn record_completion_failed(&self) {
        let mut guard = self.0.lock().expect("stats mutex poisoned");
        guard.responses_processed += 1;
        guard.completions_failed += 1;
    }

    pub fn set_consecutive_errors(&self, n: u32) {
        self.0.lock().expect("stats mutex poisoned").consecutive_errors = n;
    }
}
