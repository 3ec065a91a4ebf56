//! Per-topic fetch loop: fetchAndLock → TaskPayload → publish (spec
//! §4.1 steps 1–4).

use std::sync::Arc;
use std::time::Duration;

use exchanger_bpmn_cache::{BpmnCache, BpmnCacheError};
use exchanger_engine_client::{EngineClient, TopicSubscription};
use exchanger_messaging::MessageClient;
use exchanger_shared::config::TopicConfig;
use exchanger_shared::{ExternalTask, TaskPayload};
use tokio::sync::watch;

use crate::error::WorkerError;
use crate::stats::Stats;

const PUBLISH_MAX_ATTEMPTS: u32 = 3;
const PUBLISH_RETRY_BASE_BACKOFF: Duration = Duration::from_millis(200);

/// Runs until `shutdown` fires. Never returns early on error — consecutive
/// failures only slow the loop down, matching the Python original's
/// `min(30s, 5s * consecutive_errors)` backoff (spec §4.1, SPEC_FULL
/// supplement).
#[allow(clippy::too_many_arguments)]
pub async fn run_fetch_loop(
    topic: TopicConfig,
    worker_id: String,
    tenant_id: Option<String>,
    engine: EngineClient,
    cache: BpmnCache,
    messaging: MessageClient,
    sleep_seconds: u64,
    max_consecutive_errors: u32,
    stats: Arc<Stats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut consecutive_errors: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return;
        }

        match run_iteration(&topic, &worker_id, tenant_id.as_deref(), &engine, &cache, &messaging, &stats).await {
            Ok(fetched) => {
                consecutive_errors = 0;
                stats.set_consecutive_errors(0);
                if fetched == 0 {
                    sleep_or_shutdown(Duration::from_secs(sleep_seconds), &mut shutdown).await;
                }
            }
            Err(err) => {
                consecutive_errors += 1;
                stats.set_consecutive_errors(consecutive_errors);
                if consecutive_errors >= max_consecutive_errors {
                    tracing::error!(topic = %topic.name, %err, consecutive_errors, "fetch loop consecutive error threshold exceeded");
                } else {
                    tracing::warn!(topic = %topic.name, %err, consecutive_errors, "fetch loop iteration failed");
                }
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

async fn run_iteration(
    topic: &TopicConfig,
    worker_id: &str,
    tenant_id: Option<&str>,
    engine: &EngineClient,
    cache: &BpmnCache,
    messaging: &MessageClient,
    stats: &Stats,
) -> Result<usize, WorkerError> {
    let subscriptions = vec![TopicSubscription {
        topic_name: topic.name.clone(),
        lock_duration_ms: topic.lock_duration_ms,
    }];
    let tasks = engine
        .fetch_and_lock(worker_id, subscriptions, topic.max_tasks, topic.async_response_timeout_ms, tenant_id)
        .await?;

    stats.record_fetched(tasks.len() as u64);

    for task in tasks.iter().cloned() {
        let task_id = task.task_id.clone();
        let retries_remaining = task.retries.unwrap_or(1).saturating_sub(1).max(0);
        if let Err(err) = process_one_task(task, engine, cache, messaging, stats).await {
            stats.record_publish_failure();
            tracing::error!(task_id = %task_id, %err, "publish to system queue failed, releasing engine lock");
            if let Err(failure_err) = engine
                .failure(&task_id, worker_id, &err.to_string(), "publish to system queue failed", retries_remaining, 30_000)
                .await
            {
                tracing::error!(task_id = %task_id, error = %failure_err, "failed to report failure back to engine");
            }
        }
    }

    Ok(tasks.len())
}

async fn process_one_task(
    task: ExternalTask,
    engine: &EngineClient,
    cache: &BpmnCache,
    messaging: &MessageClient,
    stats: &Stats,
) -> Result<(), WorkerError> {
    let payload = build_task_payload(task, engine, cache).await?;
    publish_with_retry(messaging, &payload).await?;
    stats.record_published();
    Ok(())
}

/// Assembles a `TaskPayload` from a locked `ExternalTask` (spec §4.1 step
/// 2): reads process variables, looks up diagram metadata (an unsupported
/// activity type is not fatal — it just yields default metadata).
pub async fn build_task_payload(
    task: ExternalTask,
    engine: &EngineClient,
    cache: &BpmnCache,
) -> Result<TaskPayload, WorkerError> {
    let process_variables = engine.get_process_variables(&task.process_instance_id).await?;
    let metadata = match cache.get_element(&task.process_definition_id, &task.activity_id).await {
        Ok(metadata) => metadata,
        Err(BpmnCacheError::ActivityNotFound { .. }) => Default::default(),
        Err(err) => return Err(err.into()),
    };

    Ok(TaskPayload {
        task_id: task.task_id,
        topic: task.topic,
        variables: task.variables,
        process_instance_id: task.process_instance_id,
        process_definition_id: task.process_definition_id,
        process_definition_key: task.process_definition_key,
        activity_id: task.activity_id,
        activity_instance_id: task.activity_instance_id,
        worker_id: task.worker_id,
        retries: task.retries,
        create_time: task.create_time,
        priority: task.priority,
        tenant_id: task.tenant_id,
        business_key: task.business_key,
        metadata,
        process_variables,
    })
}

async fn publish_with_retry(messaging: &MessageClient, payload: &TaskPayload) -> Result<(), WorkerError> {
    let mut last_err = None;
    for attempt in 1..=PUBLISH_MAX_ATTEMPTS {
        match messaging.publish_task_payload(payload).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!(attempt, task_id = %payload.task_id, %err, "publish attempt failed");
                last_err = Some(err);
                if attempt < PUBLISH_MAX_ATTEMPTS {
                    tokio::time::sleep(PUBLISH_RETRY_BASE_BACKOFF * attempt).await;
                }
            }
        }
    }
    Err(WorkerError::PublishExhausted {
        attempts: PUBLISH_MAX_ATTEMPTS,
        source: last_err.expect("loop body always assigns last_err before exhausting attempts"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchanger_messaging::{ExchangerRouter, MessagingProvider};
    use exchanger_shared::VariableMap;

    fn sample_task() -> ExternalTask {
        ExternalTask {
            task_id: "T1".into(),
            topic: "create_task".into(),
            process_instance_id: "P1".into(),
            process_definition_id: "PD1".into(),
            process_definition_key: "K".into(),
            activity_id: "Act_1".into(),
            activity_instance_id: None,
            worker_id: "worker-1".into(),
            retries: None,
            priority: 0,
            tenant_id: None,
            business_key: None,
            variables: VariableMap::new(),
            create_time: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn build_task_payload_defaults_metadata_when_activity_not_in_diagram() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/process-instance/P1/variables"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/process-definition/PD1/xml"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bpmn20Xml": "<bpmn:definitions xmlns:bpmn=\"http://www.omg.org/spec/BPMN/20100524/MODEL\"><bpmn:process id=\"P\"></bpmn:process></bpmn:definitions>"
            })))
            .mount(&server)
            .await;

        let engine = EngineClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let cache = BpmnCache::new(engine.clone(), &exchanger_shared::config::CacheConfig::default());

        let payload = build_task_payload(sample_task(), &engine, &cache).await.unwrap();
        assert_eq!(payload.metadata.element_id, "");
    }

    #[tokio::test]
    async fn publish_with_retry_succeeds_on_first_attempt_against_in_memory_broker() {
        let messaging = MessageClient::new(
            MessagingProvider::new_in_memory(),
            ExchangerRouter::new("exchanger.topics", "responses.queue", "errors.queue"),
        );
        messaging.declare_infrastructure(&["create_task".to_string()], &[]).await.unwrap();

        let mut payload_source = sample_task();
        payload_source.variables = VariableMap::new();
        let payload = TaskPayload {
            task_id: payload_source.task_id,
            topic: payload_source.topic,
            variables: payload_source.variables,
            process_instance_id: payload_source.process_instance_id,
            process_definition_id: payload_source.process_definition_id,
            process_definition_key: payload_source.process_definition_key,
            activity_id: payload_source.activity_id,
            activity_instance_id: payload_source.activity_instance_id,
            worker_id: payload_source.worker_id,
            retries: payload_source.retries,
            create_time: payload_source.create_time,
            priority: payload_source.priority,
            tenant_id: payload_source.tenant_id,
            business_key: payload_source.business_key,
            metadata: Default::default(),
            process_variables: VariableMap::new(),
        };

        publish_with_retry(&messaging, &payload).await.unwrap();
        let received = messaging.receive_task_payload("create_task").await.unwrap();
        assert!(received.is_some());
    }
}
