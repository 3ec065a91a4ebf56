//! Entity types the core operates on (spec §3). These are semantic types,
//! not storage schemas — the engine and the downstream system own
//! persistence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::variable::TypedVariable;

pub type VariableMap = HashMap<String, TypedVariable>;

/// An engine-owned unit of work, locked by a `worker_id` for a bounded
/// duration. Only the locking worker may complete or fail it until the
/// lock expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalTask {
    pub task_id: String,
    pub topic: String,
    pub process_instance_id: String,
    pub process_definition_id: String,
    pub process_definition_key: String,
    pub activity_id: String,
    #[serde(default)]
    pub activity_instance_id: Option<String>,
    pub worker_id: String,
    pub retries: Option<i32>,
    pub priority: i64,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub business_key: Option<String>,
    #[serde(default)]
    pub variables: VariableMap,
    pub create_time: DateTime<Utc>,
}

/// Metadata parsed from the BPMN XML of a `process_definition_id`, keyed by
/// `activity_id` in the cache (spec §4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagramElementMetadata {
    pub element_id: String,
    pub display_name: String,
    #[serde(default)]
    pub extension_properties: HashMap<String, String>,
    #[serde(default)]
    pub documentation: String,
}

/// A single questionnaire question embedded in a template or response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireQuestion {
    pub code: String,
    #[serde(rename = "type")]
    pub question_type: String,
    pub name: String,
    #[serde(default)]
    pub answer: serde_json::Value,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

/// A questionnaire: a code plus its ordered questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Questionnaire {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub questions: Vec<QuestionnaireQuestion>,
}

/// A checklist node from a template's `items[]` tree (spec §4.2.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistNode {
    pub id: String,
    pub title: String,
    pub level: u32,
    pub parent_id: Option<String>,
}

/// A member of a template's accomplice/auditor/created-by/responsible
/// lists, with an optional organizational supervisor-promotion flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberSpec {
    #[serde(default)]
    pub members: Vec<i64>,
    #[serde(default)]
    pub scalar: Option<i64>,
    #[serde(default)]
    pub use_supervisor: bool,
}

/// The downstream system's blueprint for a concrete task (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub group_id: Option<i64>,
    #[serde(default)]
    pub created_by: MemberSpec,
    #[serde(default)]
    pub responsible: MemberSpec,
    #[serde(default)]
    pub accomplices: MemberSpec,
    #[serde(default)]
    pub auditors: MemberSpec,
    pub deadline_after_seconds: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub file_ids: Vec<i64>,
    #[serde(default)]
    pub checklist: Vec<ChecklistNode>,
    #[serde(default)]
    pub questionnaires_to_attach: Vec<Questionnaire>,
    #[serde(default)]
    pub questionnaires_in_description: Vec<Questionnaire>,
}

/// A downstream task as observed by the core, enriched at tracker time
/// with result/answer data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamTask {
    pub id: String,
    pub title: Option<String>,
    pub status: String,
    pub external_task_id: Option<String>,
    pub element_id: Option<String>,
    pub process_instance_id: Option<String>,
    #[serde(default)]
    pub result_expected: bool,
    pub result_answer: Option<String>,
    pub result_answer_text: Option<String>,
    #[serde(default)]
    pub questionnaires: Vec<Questionnaire>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_task_round_trips_through_json() {
        let task = ExternalTask {
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
            create_time: Utc::now(),
        };
        let json = serde_json::to_string(&task).unwrap();
        let back: ExternalTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, "T1");
    }
}
