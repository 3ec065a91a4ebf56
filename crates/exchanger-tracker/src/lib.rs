//! Polls configured sent-queues for downstream task completion and
//! publishes `CompletionEvent`s to the responses-queue (spec §4.3).

pub mod error;
pub mod health;
pub mod service;
pub mod stats;
pub mod tracker_loop;

pub use error::TrackerError;
pub use service::TrackerService;
