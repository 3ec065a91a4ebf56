//! Per-queue consumer loop: receive `TaskPayload` → [`Creator::create`] →
//! publish `SentEvent` with retries, or classify and route to the
//! errors-queue (spec §4.2 steps 1–9, §7).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use exchanger_engine_client::EngineClient;
use exchanger_messaging::MessageClient;
use exchanger_shared::{ErrorEnvelope, SentEvent, TaskPayload};
use tokio::sync::watch;

use crate::creator::Creator;
use crate::error::TaskCreatorError;
use crate::stats::Stats;

const SENT_PUBLISH_BACKOFFS_SECS: [u64; 5] = [1, 2, 4, 8, 16];

/// Runs until `shutdown` fires, or until `max_consecutive_errors`
/// connectivity failures happen in a row — per spec §7, a connectivity
/// run stops the loop, not the process; other queues' loops keep going.
#[allow(clippy::too_many_arguments)]
pub async fn run_creation_loop(
    queue: String,
    creator: Creator,
    engine: EngineClient,
    messaging: MessageClient,
    downstream_system: String,
    sent_publish_max_retries: u32,
    max_consecutive_errors: u32,
    idle_sleep: Duration,
    stats: Arc<Stats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut consecutive_errors: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return;
        }

        match messaging.receive_task_payload(&queue).await {
            Ok(Some((tag, payload))) => {
                consecutive_errors = 0;
                stats.record_received();
                handle_one(&creator, &engine, &messaging, &downstream_system, sent_publish_max_retries, &stats, tag, &payload).await;
            }
            Ok(None) => {
                sleep_or_shutdown(idle_sleep, &mut shutdown).await;
            }
            Err(err) => {
                consecutive_errors += 1;
                if consecutive_errors >= max_consecutive_errors {
                    tracing::error!(queue = %queue, %err, consecutive_errors, "consecutive connectivity errors exceeded threshold, stopping this queue's loop");
                    return;
                }
                tracing::warn!(queue = %queue, %err, consecutive_errors, "failed to receive from queue");
                let backoff = Duration::from_secs(5 * u64::from(consecutive_errors)).min(Duration::from_secs(30));
                sleep_or_shutdown(backoff, &mut shutdown).await;
            }
        }
    }
}

async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = shutdown.changed() => {}
    }
}

async fn handle_one(
    creator: &Creator,
    engine: &EngineClient,
    messaging: &MessageClient,
    downstream_system: &str,
    sent_publish_max_retries: u32,
    stats: &Stats,
    tag: u64,
    payload: &TaskPayload,
) {
    match creator.create(payload).await {
        Ok(response_data) => {
            stats.record_created();
            let event = SentEvent {
                original_queue: payload.topic.clone(),
                original_message: payload.clone(),
                response_data,
                sent_at: Utc::now(),
            };
            match publish_sent_event_with_retry(messaging, downstream_system, &event, sent_publish_max_retries, stats).await {
                Ok(()) => {
                    let _ = messaging.ack(tag).await;
                }
                Err(err) => {
                    stats.record_publish_failure();
                    tracing::error!(task_id = %payload.task_id, %err, "publishing SentEvent exhausted retries, nacking for another attempt");
                    let _ = messaging.nack(tag, true).await;
                }
            }
        }
        Err(err) if err.is_recoverable() => {
            tracing::warn!(task_id = %payload.task_id, %err, "recoverable error creating downstream task, nacking for retry");
            let _ = messaging.nack(tag, true).await;
        }
        Err(err) => {
            stats.record_downstream_error();
            route_to_errors_queue(engine, messaging, payload, &err).await;
            let _ = messaging.ack(tag).await;
        }
    }
}

async fn publish_sent_event_with_retry(
    messaging: &MessageClient,
    downstream_system: &str,
    event: &SentEvent,
    max_retries: u32,
    stats: &Stats,
) -> Result<(), exchanger_messaging::MessagingError> {
    let mut last_err = None;
    let attempts = max_retries.max(1).min(SENT_PUBLISH_BACKOFFS_SECS.len() as u32);
    for attempt in 0..attempts {
        match messaging.publish_sent_event(downstream_system, event).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!(attempt, task_id = %event.original_message.task_id, %err, "SentEvent publish attempt failed");
                stats.record_publish_retry();
                last_err = Some(err);
                if attempt + 1 < attempts {
                    tokio::time::sleep(Duration::from_secs(SENT_PUBLISH_BACKOFFS_SECS[attempt as usize])).await;
                }
            }
        }
    }
    Err(last_err.expect("loop body always assigns last_err before exhausting attempts"))
}

/// Categorizes a terminal `TaskCreatorError` into an `ErrorEnvelope` (spec
/// §7): the assignee-not-found subcategory additionally releases the
/// engine lock via `failure(retries=0)` so the work item is not left
/// stuck against an exhausted lock.
async fn route_to_errors_queue(engine: &EngineClient, messaging: &MessageClient, payload: &TaskPayload, err: &TaskCreatorError) {
    let (error_type, suggested_action, release_engine_lock) = classify(err);

    let envelope = ErrorEnvelope::new(
        serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        error_type,
        err.to_string(),
        suggested_action,
    );
    if let Err(publish_err) = messaging.publish_error(&envelope).await {
        tracing::error!(task_id = %payload.task_id, %publish_err, "failed to publish to errors-queue");
    }

    if release_engine_lock {
        if let Err(failure_err) = engine
            .failure(&payload.task_id, &payload.worker_id, &err.to_string(), error_type, 0, 0)
            .await
        {
            tracing::error!(task_id = %payload.task_id, error = %failure_err, "failed to report failure back to engine");
        }
    }
}

fn classify(err: &TaskCreatorError) -> (&'static str, &'static str, bool) {
    match err {
        TaskCreatorError::Downstream(exchanger_downstream_client::DownstreamClientError::AssigneeNotFound { .. }) => (
            "ASSIGNEE_ID_ERROR",
            "resolve the responsible/assignee mapping in the downstream system and resubmit",
            true,
        ),
        TaskCreatorError::Validation(_) => (
            "VALIDATION_ERROR",
            "check the task template's responsible/creator rules for this activity",
            true,
        ),
        TaskCreatorError::Downstream(_) => (
            "DOWNSTREAM_PROTOCOL_ERROR",
            "inspect the downstream system's rejection reason",
            true,
        ),
        _ => ("INTERNAL_ERROR", "inspect task-creator logs for details", true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignee_not_found_classifies_with_engine_release() {
        let err = TaskCreatorError::Downstream(exchanger_downstream_client::DownstreamClientError::AssigneeNotFound { assignee_id: 9 });
        let (error_type, _, release) = classify(&err);
        assert_eq!(error_type, "ASSIGNEE_ID_ERROR");
        assert!(release);
    }

    #[test]
    fn validation_error_classifies_distinctly() {
        let err = TaskCreatorError::Validation("missing RESPONSIBLE_ID".into());
        let (error_type, _, _) = classify(&err);
        assert_eq!(error_type, "VALIDATION_ERROR");
    }
}
