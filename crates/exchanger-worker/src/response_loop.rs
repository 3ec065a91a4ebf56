//! Response-drain loop: completes or fails engine tasks from
//! CompletionEvents on the responses-queue (spec §4.1 step 2).

use std::sync::Arc;

use exchanger_engine_client::{EngineClient, EngineClientError};
use exchanger_messaging::MessageClient;
use exchanger_shared::{CompletionEvent, ErrorEnvelope};
use tokio::sync::watch;

use crate::response_transform::build_engine_variables;
use crate::stats::Stats;

/// Runs on a heartbeat tick until `shutdown` fires, draining up to
/// `batch_size` responses per tick.
pub async fn run_response_loop(
    engine: EngineClient,
    messaging: MessageClient,
    heartbeat_ms: u64,
    batch_size: u32,
    stats: Arc<Stats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(heartbeat_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => return,
        }
        if *shutdown.borrow() {
            return;
        }
        drain_batch(&engine, &messaging, batch_size, &stats).await;
    }
}

async fn drain_batch(engine: &EngineClient, messaging: &MessageClient, batch_size: u32, stats: &Stats) {
    for _ in 0..batch_size {
        match messaging.receive_completion_event().await {
            Ok(Some((tag, event))) => {
                handle_completion_event(engine, messaging, tag, event, stats).await;
            }
            Ok(None) => break,
            Err(err) => {
                tracing::error!(%err, "failed to poll responses-queue");
                break;
            }
        }
    }
}

async fn handle_completion_event(
    engine: &EngineClient,
    messaging: &MessageClient,
    tag: u64,
    event: CompletionEvent,
    stats: &Stats,
) {
    let task_id = event.original_message.task_id.clone();
    if task_id.is_empty() {
        tracing::error!("completion event missing taskId, moving to errors-queue");
        publish_to_errors(messaging, &event, "MISSING_TASK_ID", "completion event carried no taskId").await;
        ack(messaging, tag).await;
        return;
    }

    let result_expected = result_expected_flag(&event.response_data);
    let result_answer_text = result_answer_text(&event.response_data);
    let variables = build_engine_variables(
        &event.original_message.variables,
        &event.response_data,
        &event.original_message.activity_id,
        result_expected,
        result_answer_text.as_deref(),
    );

    match engine.complete(&task_id, &event.original_message.worker_id, &variables).await {
        Ok(()) => {
            stats.record_completion_ok();
            ack(messaging, tag).await;
        }
        Err(EngineClientError::TaskGone { .. }) => {
            stats.record_completion_already_gone();
            ack(messaging, tag).await;
        }
        Err(err) => {
            stats.record_completion_failed();
            tracing::error!(task_id = %task_id, %err, "engine complete failed, moving to errors-queue");
            publish_to_errors(messaging, &event, "ENGINE_COMPLETE_FAILED", &err.to_string()).await;
            // Fail-closed on data: the response is enriched, so we ack rather
            // than requeue to avoid duplicating engine-side effects (spec §4.1).
            ack(messaging, tag).await;
        }
    }
}

fn result_expected_flag(response_data: &serde_json::Value) -> bool {
    response_data
        .get("result")
        .and_then(|r| r.get("task"))
        .and_then(|t| t.get("result_expected"))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

fn result_answer_text(response_data: &serde_json::Value) -> Option<String> {
    response_data
        .get("result")
        .and_then(|r| r.get("task"))
        .and_then(|t| t.get("result_answer_text"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

async fn publish_to_errors(messaging: &MessageClient, event: &CompletionEvent, error_type: &str, message: &str) {
    let original = serde_json::to_value(&event.original_message).unwrap_or_default();
    let envelope = ErrorEnvelope::new(original, error_type, message, "inspect and replay manually");
    if let Err(err) = messaging.publish_error(&envelope).await {
        tracing::error!(%err, "failed to publish to errors-queue");
    }
}

async fn ack(messaging: &MessageClient, tag: u64) {
    if let Err(err) = messaging.ack(tag).await {
        tracing::error!(%err, "failed to ack responses-queue message");
    }
}
