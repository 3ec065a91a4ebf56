//! Per-sent-queue poller: converts a `SentEvent` into a `CompletionEvent`
//! once the downstream task has reached a completed status (spec §4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use exchanger_downstream_client::DownstreamClient;
use exchanger_messaging::MessageClient;
use exchanger_shared::{CompletionEvent, DownstreamTask, ProcessingStatus, SentEvent};
use serde_json::{json, Value as JsonValue};
use tokio::sync::watch;

use crate::stats::Stats;

/// Runs one batch-poll tick per `poll_interval`, until `shutdown` fires.
/// Never exits on its own: a fetch or publish failure just requeues the
/// one affected message (spec §4.3 design notes — no poison escalation at
/// this layer).
#[allow(clippy::too_many_arguments)]
pub async fn run_tracker_loop(
    system: String,
    downstream: DownstreamClient,
    messaging: MessageClient,
    batch_size: u32,
    completed_statuses: Vec<String>,
    result_answer_mapping: HashMap<String, String>,
    poll_interval: Duration,
    stats: Arc<Stats>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        for _ in 0..batch_size {
            if *shutdown.borrow() {
                return;
            }
            match messaging.receive_sent_event(&system).await {
                Ok(Some((tag, event))) => {
                    stats.record_received();
                    handle_one(&downstream, &messaging, &completed_statuses, &result_answer_mapping, &stats, tag, event).await;
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(system = %system, %err, "failed to poll sent-queue");
                    break;
                }
            }
        }

        sleep_or_shutdown(poll_interval, &mut shutdown).await;
    }
}

async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = shutdown.changed() => {}
    }
}

async fn handle_one(
    downstream: &DownstreamClient,
    messaging: &MessageClient,
    completed_statuses: &[String],
    result_answer_mapping: &HashMap<String, String>,
    stats: &Stats,
    tag: u64,
    event: SentEvent,
) {
    let Some(task_id) = extract_task_id(&event.response_data) else {
        stats.record_requeued_missing_task_id();
        tracing::warn!(task_id = %event.original_message.task_id, "SentEvent carries no downstream task id, requeueing");
        let _ = messaging.nack(tag, true).await;
        return;
    };

    let task = match downstream.get_task(&task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            stats.record_requeued_fetch_failed();
            tracing::warn!(task_id = %task_id, "downstream task not found, requeueing");
            let _ = messaging.nack(tag, true).await;
            return;
        }
        Err(err) => {
            stats.record_requeued_fetch_failed();
            tracing::warn!(task_id = %task_id, %err, "failed to fetch downstream task, requeueing");
            let _ = messaging.nack(tag, true).await;
            return;
        }
    };

    if !completed_statuses.iter().any(|s| s == &task.status) {
        stats.record_requeued_not_completed();
        let _ = messaging.nack(tag, true).await;
        return;
    }

    let completion = CompletionEvent {
        original_message: event.original_message,
        response_data: completed_task_response(&task, result_answer_mapping),
        processing_status: ProcessingStatus::CompletedByTracker,
        processed_at: Utc::now(),
    };

    match messaging.publish_completion_event(&completion).await {
        Ok(()) => {
            stats.record_completion_published();
            let _ = messaging.ack(tag).await;
        }
        Err(err) => {
            stats.record_publish_failure();
            tracing::error!(task_id = %task_id, %err, "failed to publish CompletionEvent, requeueing");
            let _ = messaging.nack(tag, true).await;
        }
    }
}

/// `responseData.result.task.id` — the same shape the Task-Creator
/// publishes in its `SentEvent` (and the Worker reads back).
fn extract_task_id(response_data: &JsonValue) -> Option<String> {
    response_data.get("result")?.get("task")?.get("id")?.as_str().map(str::to_string)
}

/// Resolves `resultAnswer` to a human label via the configured mapping,
/// falling back to the raw id when unmapped (spec §4.3 supplement:
/// `dict.get(key, default=key)` semantics in the Python original).
fn resolve_answer_text(result_answer: Option<&str>, mapping: &HashMap<String, String>) -> Option<String> {
    result_answer.map(|id| mapping.get(id).cloned().unwrap_or_else(|| id.to_string()))
}

fn completed_task_response(task: &DownstreamTask, mapping: &HashMap<String, String>) -> JsonValue {
    let result_answer_text = resolve_answer_text(task.result_answer.as_deref(), mapping).or_else(|| task.result_answer_text.clone());
    json!({
        "result": {
            "task": {
                "id": task.id,
                "title": task.title,
                "status": task.status,
                "result_expected": task.result_expected,
                "result_answer": task.result_answer,
                "result_answer_text": result_answer_text,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_task_id_reads_nested_result_task_id() {
        let response_data = json!({"result": {"task": {"id": "D42"}}});
        assert_eq!(extract_task_id(&response_data), Some("D42".to_string()));
    }

    #[test]
    fn extract_task_id_is_none_when_shape_missing() {
        assert_eq!(extract_task_id(&json!({})), None);
    }

    #[test]
    fn resolve_answer_text_falls_back_to_raw_id_when_unmapped() {
        let mapping = HashMap::new();
        assert_eq!(resolve_answer_text(Some("7"), &mapping), Some("7".to_string()));
    }

    #[test]
    fn resolve_answer_text_uses_configured_label() {
        let mut mapping = HashMap::new();
        mapping.insert("1".to_string(), "ДА".to_string());
        assert_eq!(resolve_answer_text(Some("1"), &mapping), Some("ДА".to_string()));
    }

    #[test]
    fn completed_task_response_matches_sent_event_shape() {
        let task = DownstreamTask {
            id: "D42".into(),
            title: Some("Review".into()),
            status: "5".into(),
            external_task_id: Some("T1".into()),
            element_id: None,
            process_instance_id: None,
            result_expected: true,
            result_answer: Some("1".into()),
            result_answer_text: None,
            questionnaires: Vec::new(),
        };
        let mut mapping = HashMap::new();
        mapping.insert("1".to_string(), "ДА".to_string());
        let response = completed_task_response(&task, &mapping);
        assert_eq!(response["result"]["task"]["id"], "D42");
        assert_eq!(response["result"]["task"]["result_answer_text"], "ДА");
    }
}
