//! Template fetch and parsing (spec §4.2 step 2, §4.2.1).

use exchanger_downstream_client::DownstreamClient;
use exchanger_shared::{ChecklistNode, MemberSpec, Questionnaire, QuestionnaireQuestion, TaskTemplate};
use serde_json::Value as JsonValue;

use crate::error::TaskCreatorError;

/// `imena.camunda.tasktemplate.get` by `(processDefinitionKey, activityId)`.
pub async fn fetch_primary(
    client: &DownstreamClient,
    process_definition_key: &str,
    activity_id: &str,
) -> Result<Option<JsonValue>, TaskCreatorError> {
    Ok(client.get_template(process_definition_key, activity_id).await?)
}

/// Fallback lookup by `templateId`, used when the primary lookup returns
/// nothing (spec §4.2 step 2).
pub async fn fetch_by_id(client: &DownstreamClient, template_id: &str) -> Result<Option<JsonValue>, TaskCreatorError> {
    Ok(client.get_template_by_id(template_id).await?)
}

fn member_spec(json: &JsonValue, key: &str) -> MemberSpec {
    let Some(value) = json.get(key) else {
        return MemberSpec::default();
    };
    MemberSpec {
        members: value
            .get("MEMBERS")
            .and_then(JsonValue::as_array)
            .map(|arr| arr.iter().filter_map(JsonValue::as_i64).collect())
            .unwrap_or_default(),
        scalar: value.get("SCALAR").and_then(JsonValue::as_i64),
        use_supervisor: value
            .get("USE_SUPERVISOR")
            .and_then(JsonValue::as_str)
            .map(|s| s.eq_ignore_ascii_case("y"))
            .unwrap_or(false),
    }
}

fn string_list(json: &JsonValue, key: &str) -> Vec<String> {
    json.get(key)
        .and_then(JsonValue::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn i64_list(json: &JsonValue, key: &str) -> Vec<i64> {
    json.get(key)
        .and_then(JsonValue::as_array)
        .map(|arr| arr.iter().filter_map(JsonValue::as_i64).collect())
        .unwrap_or_default()
}

fn checklist_nodes(json: &JsonValue) -> Vec<ChecklistNode> {
    json.get("CHECKLIST")
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(ChecklistNode {
                        id: item.get("ID")?.as_str().map(str::to_string).unwrap_or_default(),
                        title: item.get("TITLE")?.as_str().unwrap_or_default().to_string(),
                        level: item.get("LEVEL").and_then(JsonValue::as_u64).unwrap_or(0) as u32,
                        parent_id: item.get("PARENT_ID").and_then(|v| v.as_str().map(str::to_string)),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn questionnaires(json: &JsonValue, key: &str) -> Vec<Questionnaire> {
    json.get(key)
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let code = item.get("CODE")?.as_str()?.to_string();
                    let title = item.get("TITLE").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    let questions = item
                        .get("QUESTIONS")
                        .and_then(JsonValue::as_array)
                        .map(|qs| {
                            qs.iter()
                                .filter_map(|q| {
                                    Some(QuestionnaireQuestion {
                                        code: q.get("CODE")?.as_str()?.to_string(),
                                        question_type: q.get("TYPE").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                                        name: q.get("NAME").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                                        answer: q.get("ANSWER").cloned().unwrap_or(JsonValue::Null),
                                        options: q.get("OPTIONS").cloned(),
                                    })
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    Some(Questionnaire { code, title, questions })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parses a raw template response into the native `TaskTemplate` shape
/// (spec §4.2.1): tolerant of missing optional sections, since a minimal
/// template only needs a title and responsible/creator rules.
pub fn parse_template(json: &JsonValue) -> TaskTemplate {
    TaskTemplate {
        title: json.get("TITLE").and_then(|v| v.as_str()).map(str::to_string),
        description: json.get("DESCRIPTION").and_then(|v| v.as_str()).map(str::to_string),
        priority: json.get("PRIORITY").and_then(JsonValue::as_i64),
        group_id: json.get("GROUP_ID").and_then(JsonValue::as_i64),
        created_by: member_spec(json, "CREATED_BY"),
        responsible: member_spec(json, "RESPONSIBLE"),
        accomplices: member_spec(json, "ACCOMPLICES"),
        auditors: member_spec(json, "AUDITORS"),
        deadline_after_seconds: json.get("DEADLINE_AFTER").and_then(JsonValue::as_i64),
        tags: string_list(json, "TAGS"),
        file_ids: i64_list(json, "FILE_IDS"),
        checklist: checklist_nodes(json),
        questionnaires_to_attach: questionnaires(json, "QUESTIONNAIRES_TO_ATTACH"),
        questionnaires_in_description: questionnaires(json, "QUESTIONNAIRES_IN_DESCRIPTION"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_member_spec_with_use_supervisor_flag() {
        let json = serde_json::json!({
            "RESPONSIBLE": {"MEMBERS": [], "SCALAR": null, "USE_SUPERVISOR": "Y"}
        });
        let spec = member_spec(&json, "RESPONSIBLE");
        assert!(spec.use_supervisor);
        assert!(spec.members.is_empty());
    }

    #[test]
    fn missing_section_yields_default_member_spec() {
        let json = serde_json::json!({});
        let spec = member_spec(&json, "RESPONSIBLE");
        assert_eq!(spec, MemberSpec::default());
    }

    #[test]
    fn parses_checklist_tree_levels() {
        let json = serde_json::json!({
            "CHECKLIST": [
                {"ID": "1", "TITLE": "Group", "LEVEL": 0},
                {"ID": "2", "TITLE": "Item", "LEVEL": 1, "PARENT_ID": "1"},
            ]
        });
        let nodes = checklist_nodes(&json);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].parent_id.as_deref(), Some("1"));
    }

    #[test]
    fn parses_full_template_minimal_fields() {
        let json = serde_json::json!({"TITLE": "Do thing", "PRIORITY": 2});
        let template = parse_template(&json);
        assert_eq!(template.title.as_deref(), Some("Do thing"));
        assert_eq!(template.priority, Some(2));
        assert!(template.checklist.is_empty());
    }
}
