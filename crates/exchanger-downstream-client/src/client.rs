//! HTTP client for the downstream work-management system (spec §6).
//!
//! Generic methods (`task.add`, `task.get`, `task.list`, ...) and the
//! vendor-specific `imena.camunda.*` extension methods used by the
//! Task-Creator and Tracker are modeled as typed wrappers over a single
//! `call` primitive, matching the webhook-URL REST convention of the
//! original downstream integration.

use std::collections::HashMap;
use std::time::Duration;

use exchanger_shared::DownstreamTask;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DownstreamClientError;

#[derive(Debug, Clone)]
pub struct DownstreamClient {
    http: reqwest::Client,
    webhook_url: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: JsonValue,
    error: Option<String>,
    #[serde(default)]
    error_description: String,
}

/// Fields present on a responsible-element lookup (`imena.camunda.diagram.responsible.get`):
/// the template id to use for task creation and the element's predecessor ids.
#[derive(Debug, Clone, Default)]
pub struct ResponsibleInfo {
    pub template_id: Option<String>,
    pub predecessor_element_ids: Vec<String>,
    pub responsible_id: Option<i64>,
}

/// One process-variable entry from `imena.camunda.diagram.properties.list`,
/// used to render the process-variables description block (spec §4.2
/// step 4c).
#[derive(Debug, Clone)]
pub struct DiagramProperty {
    pub name: String,
    pub sort: i64,
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub comment_id: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_id: i64,
    pub name: String,
    pub size: u64,
    pub download_url: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskCreateRequest {
    pub title: String,
    pub description: String,
    pub priority: Option<i64>,
    pub group_id: Option<i64>,
    pub created_by: i64,
    pub responsible_id: i64,
    pub accomplices: Vec<i64>,
    pub auditors: Vec<i64>,
    pub deadline: Option<chrono::DateTime<chrono::Utc>>,
    pub tags: Vec<String>,
    pub parent_id: Option<i64>,
    /// Finish-Start predecessor dependencies attached to the create
    /// payload itself (spec §4.2 step 5), in addition to the post-create
    /// `dependency.add` calls.
    #[serde(rename = "SE_PROJECTDEPENDENCE", skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TaskDependency>,
    /// The non-skippable "must not complete without result" parameter
    /// (spec §4.2 step 6) — always present, never derived from template
    /// or diagram data.
    #[serde(rename = "SE_PARAMETER")]
    pub parameters: Vec<TaskParameter>,
    pub custom_fields: HashMap<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDependency {
    #[serde(rename = "DEPENDS_ON_ID")]
    pub depends_on_id: String,
    #[serde(rename = "TYPE")]
    pub dependency_type: i64,
}

impl TaskDependency {
    /// `TYPE: 2` — Finish-Start, the only dependency kind the core creates.
    pub fn finish_start(depends_on_id: impl Into<String>) -> Self {
        Self {
            depends_on_id: depends_on_id.into(),
            dependency_type: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskParameter {
    #[serde(rename = "CODE")]
    pub code: i64,
    #[serde(rename = "VALUE")]
    pub value: String,
}

impl TaskParameter {
    /// `CODE: 3, VALUE: "Y"` — "do not complete without a result".
    pub fn result_required() -> Self {
        Self {
            code: 3,
            value: "Y".to_string(),
        }
    }
}

impl DownstreamClient {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, DownstreamClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            webhook_url: webhook_url.into(),
        })
    }

    async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, DownstreamClientError> {
        let response = self
            .http
            .post(format!("{}/{method}.json", self.webhook_url))
            .json(&params)
            .send()
            .await?;
        let envelope: Envelope = response.json().await?;
        if let Some(error_code) = envelope.error {
            return Err(DownstreamClientError::classify(
                error_code,
                envelope.error_description,
                params
                    .get("fields")
                    .and_then(|f| f.get("RESPONSIBLE_ID"))
                    .and_then(|v| v.as_i64()),
            ));
        }
        Ok(envelope.result)
    }

    /// Idempotency probe (spec §4.2 step 1): finds a downstream task by
    /// the engine's `taskId`, which every task created by the core
    /// carries as a custom field.
    pub async fn find_task_by_external_id(
        &self,
        external_task_id: &str,
    ) -> Result<Option<DownstreamTask>, DownstreamClientError> {
        let result = self
            .call(
                "tasks.task.list",
                serde_json::json!({
                    "filter": {"UF_CAMUNDA_ID_EXTERNAL_TASK": external_task_id},
                    "select": ["ID", "STATUS", "UF_CAMUNDA_ID_EXTERNAL_TASK", "UF_ELEMENT_ID", "UF_PROCESS_INSTANCE_ID"],
                }),
            )
            .await?;
        first_task_from_list(result)
    }

    /// Predecessor lookup (spec §4.2 step 5): finds a downstream task by
    /// `(elementId, processInstanceId)`.
    pub async fn find_task_by_element_and_instance(
        &self,
        element_id: &str,
        process_instance_id: &str,
    ) -> Result<Option<DownstreamTask>, DownstreamClientError> {
        let result = self
            .call(
                "tasks.task.list",
                serde_json::json!({
                    "filter": {
                        "UF_ELEMENT_ID": element_id,
                        "UF_PROCESS_INSTANCE_ID": process_instance_id,
                    },
                    "select": ["ID", "STATUS", "UF_ELEMENT_ID", "UF_PROCESS_INSTANCE_ID"],
                }),
            )
            .await?;
        first_task_from_list(result)
    }

    /// `tasks.task.get` with the result/answer fields the Tracker needs.
    pub async fn get_task(&self, task_id: &str) -> Result<Option<DownstreamTask>, DownstreamClientError> {
        let result = self
            .call(
                "tasks.task.get",
                serde_json::json!({
                    "taskId": task_id,
                    "select": ["*", "UF_RESULT_EXPECTED", "UF_RESULT_QUESTION", "UF_RESULT_ANSWER"],
                }),
            )
            .await?;
        let task_json = result.get("task").cloned().unwrap_or(result);
        if task_json.get("id").is_none() {
            return Ok(None);
        }
        Ok(Some(parse_downstream_task(&task_json)?))
    }

    pub async fn create_task(&self, request: &TaskCreateRequest) -> Result<DownstreamTask, DownstreamClientError> {
        let result = self.call("tasks.task.add", serde_json::json!({ "fields": request })).await?;
        let task_json = result.get("task").cloned().unwrap_or(result);
        parse_downstream_task(&task_json)
    }

    pub async fn attach_file(&self, task_id: &str, file_id: i64) -> Result<(), DownstreamClientError> {
        self.call(
            "task.files.attach",
            serde_json::json!({"taskId": task_id, "fileId": file_id}),
        )
        .await?;
        Ok(())
    }

    pub async fn add_checklist_group(&self, task_id: &str, title: &str) -> Result<String, DownstreamClientError> {
        let result = self
            .call(
                "task.checklistitem.add",
                serde_json::json!({"TASK_ID": task_id, "FIELDS": {"TITLE": title, "PARENT_ID": 0}}),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .or_else(|| result.as_i64().map(|id| id.to_string()))
            .ok_or_else(|| DownstreamClientError::MalformedResponse("checklist group id missing".into()))
    }

    pub async fn add_checklist_item(
        &self,
        task_id: &str,
        group_id: &str,
        title: &str,
    ) -> Result<(), DownstreamClientError> {
        self.call(
            "task.checklistitem.add",
            serde_json::json!({"TASK_ID": task_id, "FIELDS": {"TITLE": title, "PARENT_ID": group_id}}),
        )
        .await?;
        Ok(())
    }

    pub async fn add_dependency(&self, task_id: &str, predecessor_id: &str) -> Result<(), DownstreamClientError> {
        self.call(
            "imena.camunda.task.dependency.add",
            serde_json::json!({"taskId": task_id, "dependsOn": predecessor_id, "type": "finish_start"}),
        )
        .await?;
        Ok(())
    }

    pub async fn add_questionnaire(&self, task_id: &str, questionnaire_code: &str) -> Result<(), DownstreamClientError> {
        self.call(
            "imena.camunda.task.questionnaire.add",
            serde_json::json!({"taskId": task_id, "code": questionnaire_code}),
        )
        .await?;
        Ok(())
    }

    /// `imena.camunda.tasktemplate.get` (spec §4.2 step 2).
    pub async fn get_template(
        &self,
        process_definition_key: &str,
        activity_id: &str,
    ) -> Result<Option<JsonValue>, DownstreamClientError> {
        let result = self
            .call(
                "imena.camunda.tasktemplate.get",
                serde_json::json!({"processDefinitionKey": process_definition_key, "activityId": activity_id}),
            )
            .await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    pub async fn get_template_by_id(&self, template_id: &str) -> Result<Option<JsonValue>, DownstreamClientError> {
        let result = self
            .call("imena.camunda.tasktemplate.get", serde_json::json!({"templateId": template_id}))
            .await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    /// `imena.camunda.diagram.responsible.get` (spec §4.2 step 2 fallback,
    /// step 5 predecessor resolution).
    pub async fn get_responsible_info(
        &self,
        process_definition_id: &str,
        activity_id: &str,
    ) -> Result<ResponsibleInfo, DownstreamClientError> {
        let result = self
            .call(
                "imena.camunda.diagram.responsible.get",
                serde_json::json!({"processDefinitionId": process_definition_id, "activityId": activity_id}),
            )
            .await?;
        Ok(ResponsibleInfo {
            template_id: result.get("templateId").and_then(|v| v.as_str()).map(str::to_string),
            predecessor_element_ids: result
                .get("predecessors")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            responsible_id: result.get("responsibleId").and_then(|v| v.as_i64()),
        })
    }

    /// `imena.camunda.diagram.properties.list` (spec §4.2 step 4c).
    pub async fn get_diagram_properties(
        &self,
        process_definition_id: &str,
        activity_id: &str,
    ) -> Result<Vec<DiagramProperty>, DownstreamClientError> {
        let result = self
            .call(
                "imena.camunda.diagram.properties.list",
                serde_json::json!({"processDefinitionId": process_definition_id, "activityId": activity_id}),
            )
            .await?;
        let items = result.as_array().cloned().unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?.to_string();
                let sort = item.get("sort").and_then(|v| v.as_i64()).unwrap_or(0);
                Some(DiagramProperty { name, sort })
            })
            .collect())
    }

    pub async fn get_user_supervisor(&self, user_id: i64) -> Result<Option<i64>, DownstreamClientError> {
        let result = self
            .call("imena.camunda.user.supervisor.get", serde_json::json!({"userId": user_id}))
            .await?;
        Ok(result.get("supervisorId").and_then(|v| v.as_i64()))
    }

    pub async fn get_user_name(&self, user_id: i64) -> Result<Option<String>, DownstreamClientError> {
        let result = self.call("user.get", serde_json::json!({"ID": user_id})).await?;
        let name = result
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|u| u.get("NAME").and_then(|v| v.as_str()))
            .map(str::to_string);
        Ok(name)
    }

    pub async fn get_list_element_name(&self, iblock_id: i64, element_id: &str) -> Result<Option<String>, DownstreamClientError> {
        let result = self
            .call(
                "lists.element.get",
                serde_json::json!({"IBLOCK_ID": iblock_id, "ELEMENT_ID": element_id}),
            )
            .await?;
        Ok(result.get("NAME").and_then(|v| v.as_str()).map(str::to_string))
    }

    /// Mandatory post-creation sync call (spec §4.2 step 9).
    pub async fn sync(&self, process_definition_key: &str, process_instance_id: &str) -> Result<(), DownstreamClientError> {
        self.call(
            "imena.camunda.sync",
            serde_json::json!({"processDefinitionKey": process_definition_key, "processInstanceId": process_instance_id}),
        )
        .await?;
        Ok(())
    }

    pub async fn get_task_results(&self, task_id: &str) -> Result<Vec<TaskResult>, DownstreamClientError> {
        let result = self
            .call("task.result.list", serde_json::json!({"filter": {"TASK_ID": task_id}}))
            .await?;
        let items = result.as_array().cloned().unwrap_or_default();
        let mut results = Vec::new();
        for item in items {
            let comment_id = item
                .get("COMMENT_ID")
                .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())))
                .unwrap_or_default();
            let text = item.get("TEXT").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let attachments = self.get_comment_attachments(&comment_id).await?;
            results.push(TaskResult { comment_id, text, attachments });
        }
        Ok(results)
    }

    pub async fn get_comment_attachments(&self, comment_id: &str) -> Result<Vec<Attachment>, DownstreamClientError> {
        if comment_id.is_empty() {
            return Ok(Vec::new());
        }
        let result = self
            .call("task.commentitem.get", serde_json::json!({"ID": comment_id}))
            .await?;
        let files = result.get("FILES").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(files
            .into_iter()
            .filter_map(|f| {
                Some(Attachment {
                    file_id: f.get("id")?.as_i64()?,
                    name: f.get("name")?.as_str()?.to_string(),
                    size: f.get("size").and_then(|v| v.as_u64()).unwrap_or(0),
                    download_url: f.get("urlDownload").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    /// `imena.camunda.userfield.list` — the startup precondition check
    /// (spec §6): the downstream system must expose the required custom
    /// task fields with the expected types.
    pub async fn list_user_fields(&self) -> Result<Vec<UserFieldDescriptor>, DownstreamClientError> {
        let result = self.call("imena.camunda.userfield.list", serde_json::json!({})).await?;
        let items = result.as_array().cloned().unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(|f| {
                Some(UserFieldDescriptor {
                    field_name: f.get("FIELD_NAME")?.as_str()?.to_string(),
                    user_type_id: f.get("USER_TYPE_ID")?.as_str()?.to_string(),
                })
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct UserFieldDescriptor {
    pub field_name: String,
    pub user_type_id: String,
}

fn first_task_from_list(result: JsonValue) -> Result<Option<DownstreamTask>, DownstreamClientError> {
    let tasks = result
        .get("tasks")
        .and_then(|v| v.as_array())
        .cloned()
        .or_else(|| result.as_array().cloned())
        .unwrap_or_default();
    match tasks.into_iter().next() {
        Some(task_json) => Ok(Some(parse_downstream_task(&task_json)?)),
        None => Ok(None),
    }
}

fn parse_downstream_task(task_json: &JsonValue) -> Result<DownstreamTask, DownstreamClientError> {
    let id = task_json
        .get("id")
        .or_else(|| task_json.get("ID"))
        .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())))
        .ok_or_else(|| DownstreamClientError::MalformedResponse("task has no id".into()))?;

    Ok(DownstreamTask {
        id,
        title: field_str(task_json, "title", "TITLE"),
        status: field_str(task_json, "status", "STATUS").unwrap_or_default(),
        external_task_id: field_str(task_json, "ufCamundaIdExternalTask", "UF_CAMUNDA_ID_EXTERNAL_TASK"),
        element_id: field_str(task_json, "ufElementId", "UF_ELEMENT_ID"),
        process_instance_id: field_str(task_json, "ufProcessInstanceId", "UF_PROCESS_INSTANCE_ID"),
        result_expected: field_bool(task_json, "ufResultExpected", "UF_RESULT_EXPECTED"),
        result_answer: field_str(task_json, "ufResultAnswer", "UF_RESULT_ANSWER"),
        result_answer_text: field_str(task_json, "ufResultAnswer_text", "UF_RESULT_ANSWER_TEXT"),
        questionnaires: Vec::new(),
    })
}

fn field_str(value: &JsonValue, camel: &str, upper: &str) -> Option<String> {
    value
        .get(camel)
        .or_else(|| value.get(upper))
        .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())))
}

fn field_bool(value: &JsonValue, camel: &str, upper: &str) -> bool {
    let raw = value.get(camel).or_else(|| value.get(upper));
    match raw {
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::String(s)) => matches!(s.to_lowercase().as_str(), "1" | "y" | "yes" | "true" | "да"),
        Some(JsonValue::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn find_task_by_external_id_returns_none_when_list_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks.task.list.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": {"tasks": []}})))
            .mount(&server)
            .await;

        let client = DownstreamClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let found = client.find_task_by_external_id("T1").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn find_task_by_external_id_returns_existing_task() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks.task.list.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"tasks": [{"id": "D42", "status": "2", "ufCamundaIdExternalTask": "T1"}]}
            })))
            .mount(&server)
            .await;

        let client = DownstreamClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let found = client.find_task_by_external_id("T1").await.unwrap().unwrap();
        assert_eq!(found.id, "D42");
    }

    #[tokio::test]
    async fn protocol_error_with_assignee_pattern_classifies_as_assignee_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks.task.add.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "ACCESS_DENIED",
                "error_description": "Ответственный не найден"
            })))
            .mount(&server)
            .await;

        let client = DownstreamClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let mut request = TaskCreateRequest {
            responsible_id: 9999,
            ..Default::default()
        };
        request.custom_fields.insert("RESPONSIBLE_ID".into(), serde_json::json!(9999));
        let result = client.create_task(&request).await;
        assert!(matches!(result, Err(DownstreamClientError::AssigneeNotFound { .. })));
    }

    #[tokio::test]
    async fn get_task_resolves_result_expected_boolean_from_bitrix_style_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks.task.get.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"task": {"id": "D1", "status": "5", "ufResultExpected": "Y"}}
            })))
            .mount(&server)
            .await;

        let client = DownstreamClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let task = client.get_task("D1").await.unwrap().unwrap();
        assert!(task.result_expected);
    }
}
