//! HTTP client for the engine's External Task REST surface (spec §6).

use std::collections::HashMap;
use std::time::Duration;

use exchanger_shared::variable::WireVariable;
use exchanger_shared::{ExternalTask, VariableMap};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::EngineClientError;

#[derive(Debug, Clone)]
pub struct EngineClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicSubscription {
    #[serde(rename = "topicName")]
    pub topic_name: String,
    #[serde(rename = "lockDuration")]
    pub lock_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
struct FetchAndLockRequest<'a> {
    #[serde(rename = "workerId")]
    worker_id: &'a str,
    #[serde(rename = "maxTasks")]
    max_tasks: u32,
    topics: Vec<TopicSubscription>,
    #[serde(rename = "asyncResponseTimeout")]
    async_response_timeout: u64,
    #[serde(rename = "usePriority")]
    use_priority: bool,
    #[serde(skip_serializing_if = "Option::is_none", rename = "tenantIdIn")]
    tenant_id_in: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawExternalTask {
    id: String,
    topic_name: String,
    process_instance_id: String,
    process_definition_id: String,
    process_definition_key: String,
    activity_id: String,
    #[serde(default)]
    activity_instance_id: Option<String>,
    worker_id: String,
    retries: Option<i32>,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    business_key: Option<String>,
    #[serde(default)]
    variables: HashMap<String, WireVariable>,
}

impl EngineClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Locks up to `max_tasks` tasks per topic for `worker_id` (spec §4.1
    /// step 1). Returns an empty vec when the engine has nothing to offer.
    pub async fn fetch_and_lock(
        &self,
        worker_id: &str,
        topics: Vec<TopicSubscription>,
        max_tasks: u32,
        async_response_timeout_ms: u64,
        tenant_id: Option<&str>,
    ) -> Result<Vec<ExternalTask>, EngineClientError> {
        let request = FetchAndLockRequest {
            worker_id,
            max_tasks,
            topics,
            async_response_timeout: async_response_timeout_ms,
            use_priority: true,
            tenant_id_in: tenant_id.map(|t| vec![t.to_string()]),
        };

        let response = self
            .http
            .post(format!("{}/external-task/fetchAndLock", self.base_url))
            .json(&request)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let raw: Vec<RawExternalTask> = response.json().await?;

        Ok(raw
            .into_iter()
            .map(|t| ExternalTask {
                task_id: t.id,
                topic: t.topic_name,
                process_instance_id: t.process_instance_id,
                process_definition_id: t.process_definition_id,
                process_definition_key: t.process_definition_key,
                activity_id: t.activity_id,
                activity_instance_id: t.activity_instance_id,
                worker_id: t.worker_id,
                retries: t.retries,
                priority: t.priority,
                tenant_id: t.tenant_id,
                business_key: t.business_key,
                variables: t
                    .variables
                    .iter()
                    .map(|(k, v)| (k.clone(), exchanger_shared::TypedVariable::from_wire(v)))
                    .collect(),
                create_time: chrono::Utc::now(),
            })
            .collect())
    }

    /// `GET /process-instance/{id}/variables` (spec §6).
    pub async fn get_process_variables(
        &self,
        process_instance_id: &str,
    ) -> Result<VariableMap, EngineClientError> {
        let response = self
            .http
            .get(format!(
                "{}/process-instance/{process_instance_id}/variables",
                self.base_url
            ))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let raw: HashMap<String, WireVariable> = response.json().await?;
        Ok(raw
            .iter()
            .map(|(k, v)| (k.clone(), exchanger_shared::TypedVariable::from_wire(v)))
            .collect())
    }

    /// `GET /process-definition/{id}/xml` (spec §6, feeds the BPMN
    /// metadata cache).
    pub async fn get_process_xml(
        &self,
        process_definition_id: &str,
    ) -> Result<String, EngineClientError> {
        let response = self
            .http
            .get(format!(
                "{}/process-definition/{process_definition_id}/xml",
                self.base_url
            ))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body: XmlResponse = response.json().await?;
        Ok(body.bpmn20_xml)
    }

    /// `POST /external-task/{id}/complete`. 204 is success; 404 means the
    /// task is already gone (spec §4.1: treated as success by the caller);
    /// any other status is a protocol error.
    pub async fn complete(
        &self,
        task_id: &str,
        worker_id: &str,
        variables: &VariableMap,
    ) -> Result<(), EngineClientError> {
        let wire_variables: HashMap<String, WireVariable> = variables
            .iter()
            .map(|(k, v)| (k.clone(), v.to_wire()))
            .collect();

        let response = self
            .http
            .post(format!("{}/external-task/{task_id}/complete", self.base_url))
            .json(&serde_json::json!({
                "workerId": worker_id,
                "variables": wire_variables,
            }))
            .send()
            .await?;

        match response.status().as_u16() {
            204 => Ok(()),
            404 => Err(EngineClientError::TaskGone {
                task_id: task_id.to_string(),
            }),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(EngineClientError::Protocol { status, message })
            }
        }
    }

    /// `POST /external-task/{id}/failure` (spec §6, §7).
    pub async fn failure(
        &self,
        task_id: &str,
        worker_id: &str,
        error_message: &str,
        error_details: &str,
        retries: i32,
        retry_timeout_ms: u64,
    ) -> Result<(), EngineClientError> {
        let response = self
            .http
            .post(format!("{}/external-task/{task_id}/failure", self.base_url))
            .json(&serde_json::json!({
                "workerId": worker_id,
                "errorMessage": error_message,
                "errorDetails": error_details,
                "retries": retries,
                "retryTimeout": retry_timeout_ms,
            }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct XmlResponse {
    #[serde(rename = "bpmn20Xml")]
    bpmn20_xml: String,
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EngineClientError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        let message = response
            .json::<JsonValue>()
            .await
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_default();
        Err(EngineClientError::Protocol { status, message })
    }
}
