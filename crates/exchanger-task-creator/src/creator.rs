//! The per-message algorithm (spec §4.2 steps 1–9): idempotency probe,
//! template-first field assembly with a fallback shape, predecessor
//! dependencies, task creation, best-effort side effects, and the
//! mandatory sync call.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use exchanger_downstream_client::{DownstreamClient, TaskCreateRequest, TaskDependency, TaskParameter};
use exchanger_shared::{DiagramElementMetadata, DownstreamTask, MemberSpec, TaskPayload, TaskTemplate, TypedVariable, VariableMap};
use serde_json::{json, Value as JsonValue};

use crate::error::TaskCreatorError;
use crate::field_derivation::{self, MemberResolutionInput};
use crate::services::{
    checklist_service, diagram_service, file_service, predecessor_service, questionnaire_service, sync_service,
    template_service, user_service,
};

#[derive(Clone)]
pub struct Creator {
    downstream: DownstreamClient,
    default_priority: i64,
}

impl Creator {
    pub fn new(downstream: DownstreamClient, default_priority: i64) -> Self {
        Self { downstream, default_priority }
    }

    /// Runs the full algorithm for one `TaskPayload`. Returns the
    /// response-data shape published in the `SentEvent`
    /// (`{result: {task: {...}}}`, the same shape the Worker reads back
    /// out of a `CompletionEvent`).
    pub async fn create(&self, payload: &TaskPayload) -> Result<JsonValue, TaskCreatorError> {
        if let Some(existing) = self.downstream.find_task_by_external_id(&payload.task_id).await? {
            tracing::warn!(
                task_id = %payload.task_id,
                downstream_id = %existing.id,
                "downstream task already exists for this taskId, skipping re-creation"
            );
            return Ok(task_response(&existing));
        }

        let responsible = diagram_service::responsible_info(&self.downstream, &payload.process_definition_id, &payload.activity_id).await?;

        let primary = template_service::fetch_primary(&self.downstream, &payload.process_definition_key, &payload.activity_id).await?;
        let template_json = match primary {
            Some(json) => Some(json),
            None => match &responsible.template_id {
                Some(template_id) => template_service::fetch_by_id(&self.downstream, template_id).await?,
                None => None,
            },
        };
        let is_fallback = template_json.is_none();
        let template = template_json.as_ref().map(template_service::parse_template).unwrap_or_default();

        let predecessor_tasks = predecessor_service::find_predecessor_tasks(
            &self.downstream,
            &responsible.predecessor_element_ids,
            &payload.process_instance_id,
        )
        .await?;

        let initiator = started_by(&payload.process_variables);

        let title = if is_fallback {
            fallback_title(&payload.metadata, &payload.topic)
        } else {
            template.title.clone().unwrap_or_else(|| fallback_title(&payload.metadata, &payload.topic))
        };
        let description_base = if is_fallback { Some(title.clone()) } else { template.description.clone() };

        let description = self.build_description(payload, &template, &predecessor_tasks, description_base).await?;
        let request = self
            .build_request(payload, &template, &payload.metadata, title, description, initiator, &predecessor_tasks)
            .await?;

        let created = self.downstream.create_task(&request).await?;

        predecessor_service::add_dependencies(&self.downstream, &created.id, &predecessor_tasks).await;

        if !is_fallback {
            file_service::attach_template_files(&self.downstream, &created.id, &template.file_ids).await;
            checklist_service::create_checklist(&self.downstream, &created.id, &template.checklist).await;
            questionnaire_service::attach_questionnaires(&self.downstream, &created.id, &template.questionnaires_to_attach).await;
        }
        predecessor_service::attach_result_files(&self.downstream, &created.id, &predecessor_tasks).await;

        sync_service::sync(&self.downstream, &payload.process_definition_key, &payload.process_instance_id).await;

        Ok(task_response(&created))
    }

    /// Description augmentation (spec §4.2 step 4): `description_base`
    /// (template description, or the fallback title) followed by the
    /// questionnaires-in-description block, the process-variables block,
    /// and the predecessor-results block, each separated by a horizontal
    /// rule.
    async fn build_description(
        &self,
        payload: &TaskPayload,
        template: &TaskTemplate,
        predecessor_tasks: &[DownstreamTask],
        description_base: Option<String>,
    ) -> Result<String, TaskCreatorError> {
        let mut sections = Vec::new();
        if let Some(base) = description_base.filter(|s| !s.is_empty()) {
            sections.push(base);
        }

        for questionnaire in &template.questionnaires_in_description {
            let block = questionnaire_service::render_questionnaire_block(&self.downstream, questionnaire, &payload.process_variables).await;
            sections.push(block);
        }

        let properties = diagram_service::diagram_properties(&self.downstream, &payload.process_definition_id, &payload.activity_id).await?;
        if !properties.is_empty() {
            sections.push(diagram_service::render_process_variables_block(&properties, &payload.process_variables));
        }

        let results_block = predecessor_service::render_results_block(&self.downstream, predecessor_tasks).await?;
        if !results_block.is_empty() {
            sections.push(results_block);
        }

        Ok(sections.join("\n\n---\n\n"))
    }

    async fn build_request(
        &self,
        payload: &TaskPayload,
        template: &TaskTemplate,
        metadata: &DiagramElementMetadata,
        title: String,
        description: String,
        initiator: Option<i64>,
        predecessor_tasks: &[DownstreamTask],
    ) -> Result<TaskCreateRequest, TaskCreatorError> {
        let now = Utc::now();

        let created_by = self.resolve_user_field(&template.created_by, initiator).await?;
        let responsible_id = self.resolve_user_field(&template.responsible, initiator).await?;
        if responsible_id <= 0 {
            return Err(TaskCreatorError::Validation(
                "RESPONSIBLE_ID did not resolve to a positive id before downstream create".into(),
            ));
        }

        let accomplices = self.resolve_member_list_field(&template.accomplices, initiator).await?;
        let mut auditors = self.resolve_member_list_field(&template.auditors, initiator).await?;
        auditors = field_derivation::apply_auditor_fallback(auditors, diagram_owner(&payload.process_variables));

        let deadline = field_derivation::resolve_deadline(deadline_pv(&payload.process_variables), template.deadline_after_seconds, now);
        let group_id = field_derivation::resolve_group_id(template.group_id, group_id_pv(&payload.process_variables));
        let priority = field_derivation::resolve_priority(template.priority, self.default_priority);
        let tags_joined = field_derivation::resolve_tags(&template.tags);
        let parent_id = field_derivation::resolve_parent_id(parent_task_id_pv(&payload.process_variables));

        let mut custom_fields: HashMap<String, JsonValue> = HashMap::new();
        custom_fields.insert("externalTaskId".into(), json!(payload.task_id));
        custom_fields.insert("elementId".into(), json!(payload.activity_id));
        custom_fields.insert("processInstanceId".into(), json!(payload.process_instance_id));
        if parent_id.is_some() {
            custom_fields.insert("SUBORDINATE".into(), json!("Y"));
        }
        // UF_RESULT_EXPECTED comes solely from the element's extension
        // properties, never force-set (spec §4.1.3, §8 "no answer
        // expected" scenario): it must be absent unless the BPMN element
        // actually declares it.
        for (key, value) in extension_property_fields(&metadata.extension_properties) {
            custom_fields.insert(key, value);
        }

        let dependencies = predecessor_tasks
            .iter()
            .map(|predecessor| TaskDependency::finish_start(predecessor.id.clone()))
            .collect();

        Ok(TaskCreateRequest {
            title,
            description,
            priority: Some(priority),
            group_id,
            created_by,
            responsible_id,
            accomplices,
            auditors,
            deadline,
            tags: if tags_joined.is_empty() { Vec::new() } else { vec![tags_joined] },
            parent_id,
            dependencies,
            // The "must not complete without result" parameter is
            // non-skippable (spec §4.2 step 6) — distinct from, and
            // always set regardless of, UF_RESULT_EXPECTED.
            parameters: vec![TaskParameter::result_required()],
            custom_fields,
        })
    }

    async fn resolve_user_field(&self, spec: &MemberSpec, initiator: Option<i64>) -> Result<i64, TaskCreatorError> {
        let supervisor = self.supervisor_for(spec, initiator).await?;
        let resolved = field_derivation::resolve_member_id(&MemberResolutionInput {
            spec: spec.clone(),
            initiator,
            supervisor_of_initiator: supervisor,
        });
        if resolved.used_default {
            tracing::warn!("no responsible/creator rule matched, defaulting to user id 1");
        }
        Ok(resolved.id)
    }

    async fn resolve_member_list_field(&self, spec: &MemberSpec, initiator: Option<i64>) -> Result<Vec<i64>, TaskCreatorError> {
        let supervisor = self.supervisor_for(spec, initiator).await?;
        Ok(field_derivation::resolve_member_list(spec, supervisor))
    }

    async fn supervisor_for(&self, spec: &MemberSpec, initiator: Option<i64>) -> Result<Option<i64>, TaskCreatorError> {
        match (spec.use_supervisor, initiator) {
            (true, Some(user_id)) => user_service::supervisor_of(&self.downstream, user_id).await,
            _ => Ok(None),
        }
    }
}

fn fallback_title(metadata: &DiagramElementMetadata, topic: &str) -> String {
    if !metadata.display_name.is_empty() {
        metadata.display_name.clone()
    } else {
        format!("Task: {topic}")
    }
}

fn extension_property_fields(properties: &HashMap<String, String>) -> HashMap<String, JsonValue> {
    properties
        .iter()
        .map(|(key, value)| {
            let coerced = match value.to_lowercase().as_str() {
                "y" | "true" => json!(true),
                "n" | "false" => json!(false),
                _ => json!(value),
            };
            (key.clone(), coerced)
        })
        .collect()
}

fn task_response(task: &DownstreamTask) -> JsonValue {
    json!({
        "result": {
            "task": {
                "id": task.id,
                "title": task.title,
                "status": task.status,
                "result_expected": task.result_expected,
                "result_answer_text": task.result_answer_text,
            }
        }
    })
}

fn started_by(vars: &VariableMap) -> Option<i64> {
    raw_i64(vars.get("startedBy"))
}

fn diagram_owner(vars: &VariableMap) -> Option<i64> {
    raw_i64(vars.get("diagramOwner"))
}

fn group_id_pv(vars: &VariableMap) -> Option<i64> {
    raw_i64(vars.get("groupId"))
}

fn parent_task_id_pv(vars: &VariableMap) -> Option<i64> {
    raw_i64(vars.get("parentTaskId"))
}

fn deadline_pv(vars: &VariableMap) -> Option<DateTime<Utc>> {
    match vars.get("deadline") {
        Some(TypedVariable::Date(dt)) => Some(*dt),
        Some(TypedVariable::String(s)) => chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

fn raw_i64(value: Option<&TypedVariable>) -> Option<i64> {
    match value {
        Some(TypedVariable::Long(n)) => Some(*n),
        Some(TypedVariable::String(s)) => s.trim().parse().ok(),
        Some(TypedVariable::Double(f)) => Some(*f as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_properties_lift_yes_no_flags_to_booleans() {
        let mut props = HashMap::new();
        props.insert("urgent".to_string(), "Y".to_string());
        props.insert("note".to_string(), "free text".to_string());
        let fields = extension_property_fields(&props);
        assert_eq!(fields.get("urgent"), Some(&json!(true)));
        assert_eq!(fields.get("note"), Some(&json!("free text")));
    }

    #[test]
    fn fallback_title_prefers_diagram_display_name() {
        let mut metadata = DiagramElementMetadata::default();
        metadata.display_name = "Review request".to_string();
        assert_eq!(fallback_title(&metadata, "create_task"), "Review request");
    }

    #[test]
    fn fallback_title_derives_from_topic_when_no_display_name() {
        let metadata = DiagramElementMetadata::default();
        assert_eq!(fallback_title(&metadata, "create_task"), "Task: create_task");
    }

    #[test]
    fn task_response_matches_worker_extraction_shape() {
        let task = DownstreamTask {
            id: "D42".into(),
            title: Some("Do it".into()),
            status: "2".into(),
            external_task_id: Some("T1".into()),
            element_id: None,
            process_instance_id: None,
            result_expected: true,
            result_answer: None,
            result_answer_text: None,
            questionnaires: Vec::new(),
        };
        let response = task_response(&task);
        assert_eq!(response["result"]["task"]["id"], "D42");
        assert_eq!(response["result"]["task"]["result_expected"], true);
    }
}
