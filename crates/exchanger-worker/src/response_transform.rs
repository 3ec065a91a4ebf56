//! Pure transforms applied to a downstream response before it is
//! completed back into the engine (spec §4.1.1–§4.1.4). Kept free of I/O
//! so the testable properties in spec §8 (#5, #6) can be checked directly.

use exchanger_shared::{TypedVariable, VariableMap};
use serde_json::Value as JsonValue;

/// Copies a strict subset of the downstream task back into engine
/// variables (spec §4.1.1): no bulk dump of the response is written.
pub fn extract_response_fields(response_data: &JsonValue) -> VariableMap {
    let mut vars = VariableMap::new();
    let Some(task) = response_data.get("result").and_then(|r| r.get("task")) else {
        return vars;
    };

    if let Some(id) = get_str(task, "id") {
        vars.insert("downstreamTaskId".into(), TypedVariable::String(id.to_string()));
    }
    if let Some(title) = get_str(task, "title") {
        vars.insert("downstreamTaskTitle".into(), TypedVariable::String(title.to_string()));
    }
    if let Some(status) = get_str(task, "status") {
        vars.insert("downstreamTaskStatus".into(), TypedVariable::String(status.to_string()));
    }
    if let Some(answer_text) = get_str(task, "result_answer_text") {
        vars.insert(
            "downstreamTaskResultAnswerText".into(),
            TypedVariable::String(answer_text.to_string()),
        );
    }
    vars
}

/// Expands `questionnaires.items[*].questions[*]` into flat process
/// variables named `{activityId}_{questionnaireCode}_{questionCode}`
/// (spec §4.1.2).
pub fn expand_questionnaire_answers(activity_id: &str, response_data: &JsonValue) -> VariableMap {
    let mut vars = VariableMap::new();
    let Some(items) = response_data
        .get("questionnaires")
        .and_then(|q| q.get("items"))
        .and_then(JsonValue::as_array)
    else {
        return vars;
    };

    for item in items {
        let Some(questionnaire_code) = get_str_ci(item, "code") else {
            continue;
        };
        let Some(questions) = item.get("questions").and_then(JsonValue::as_array) else {
            continue;
        };
        for question in questions {
            let Some(question_code) = get_str_ci(question, "code") else {
                continue;
            };
            let question_type = get_str_ci(question, "type").unwrap_or_default().to_lowercase();
            let raw = question.get("answer").cloned().unwrap_or(JsonValue::Null);
            let var_name = format!("{activity_id}_{questionnaire_code}_{question_code}");
            vars.insert(var_name, coerce_questionnaire_answer(&question_type, &raw));
        }
    }
    vars
}

fn coerce_questionnaire_answer(question_type: &str, raw: &JsonValue) -> TypedVariable {
    match question_type {
        "boolean" => TypedVariable::Boolean(is_truthy(raw)),
        "integer" => match raw_to_i64(raw) {
            Some(n) => TypedVariable::Long(n),
            None => {
                tracing::warn!(?raw, "questionnaire integer answer not parseable, keeping as string");
                TypedVariable::String(raw_to_string(raw))
            }
        },
        "string" | "date" => TypedVariable::String(raw_to_string(raw)),
        _ => TypedVariable::String(raw_to_string(raw)),
    }
}

fn is_truthy(raw: &JsonValue) -> bool {
    match raw {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
        JsonValue::String(s) => matches!(s.to_lowercase().as_str(), "true" | "1" | "y" | "yes" | "да"),
        _ => false,
    }
}

fn raw_to_i64(raw: &JsonValue) -> Option<i64> {
    match raw {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn raw_to_string(raw: &JsonValue) -> String {
    match raw {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn get_str<'a>(value: &'a JsonValue, key: &str) -> Option<&'a str> {
    value.get(key)?.as_str()
}

fn get_str_ci<'a>(value: &'a JsonValue, key_lower: &str) -> Option<&'a str> {
    value
        .as_object()?
        .iter()
        .find(|(k, _)| k.to_lowercase() == key_lower)
        .and_then(|(_, v)| v.as_str())
}

/// Resolves the `activityId`-named completion variable (spec §4.1.3).
/// Returns `None` when no answer was expected — the caller must not
/// write the variable at all in that case, not even with a default.
pub fn activity_answer_variable(
    activity_id: &str,
    result_expected: bool,
    result_answer_text: Option<&str>,
) -> Option<(String, TypedVariable)> {
    if !result_expected {
        return None;
    }
    let value = match result_answer_text.map(str::trim) {
        Some("ДА") => "ok",
        Some("НЕТ") => "no",
        Some(other) if !other.is_empty() => {
            tracing::warn!(answer = other, "unrecognized activity answer text, defaulting to \"no\"");
            "no"
        }
        _ => "no",
    };
    Some((activity_id.to_string(), TypedVariable::String(value.to_string())))
}

/// Builds the full engine variable map for a completion (spec §4.1 step
/// 2): original variables, then response-field overlay, then
/// questionnaire expansion, then the activity-answer variable — none of
/// which overwrites a key already present from an earlier layer.
pub fn build_engine_variables(
    original: &VariableMap,
    response_data: &JsonValue,
    activity_id: &str,
    result_expected: bool,
    result_answer_text: Option<&str>,
) -> VariableMap {
    let mut vars = original.clone();
    for (key, value) in extract_response_fields(response_data) {
        vars.entry(key).or_insert(value);
    }
    for (key, value) in expand_questionnaire_answers(activity_id, response_data) {
        vars.entry(key).or_insert(value);
    }
    if let Some((name, value)) = activity_answer_variable(activity_id, result_expected, result_answer_text) {
        vars.entry(name).or_insert(value);
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_strict_subset_of_downstream_task_fields() {
        let response = serde_json::json!({"result": {"task": {
            "id": "D42", "title": "Do the thing", "status": "5", "result_answer_text": "ДА"
        }}});
        let vars = extract_response_fields(&response);
        assert_eq!(vars.get("downstreamTaskId"), Some(&TypedVariable::String("D42".into())));
        assert_eq!(vars.get("downstreamTaskStatus"), Some(&TypedVariable::String("5".into())));
        assert_eq!(vars.len(), 4);
    }

    #[test]
    fn null_boolean_questionnaire_answer_coerces_to_false_not_null() {
        let response = serde_json::json!({
            "questionnaires": {"items": [{"code": "Q1", "questions": [
                {"CODE": "Q1A", "TYPE": "boolean", "answer": null}
            ]}]}
        });
        let vars = expand_questionnaire_answers("Act_1", &response);
        assert_eq!(vars.get("Act_1_Q1_Q1A"), Some(&TypedVariable::Boolean(false)));
    }

    #[test]
    fn truthy_questionnaire_boolean_variants_all_resolve_true() {
        for raw in ["true", "1", "y", "yes", "да", "ДА"] {
            let response = serde_json::json!({
                "questionnaires": {"items": [{"code": "Q1", "questions": [
                    {"CODE": "Q1A", "TYPE": "boolean", "answer": raw}
                ]}]}
            });
            let vars = expand_questionnaire_answers("Act_1", &response);
            assert_eq!(vars.get("Act_1_Q1_Q1A"), Some(&TypedVariable::Boolean(true)), "failed for {raw}");
        }
    }

    #[test]
    fn unparseable_integer_answer_falls_back_to_string() {
        let response = serde_json::json!({
            "questionnaires": {"items": [{"code": "Q1", "questions": [
                {"CODE": "Q1B", "TYPE": "integer", "answer": "not-a-number"}
            ]}]}
        });
        let vars = expand_questionnaire_answers("Act_1", &response);
        assert_eq!(vars.get("Act_1_Q1_Q1B"), Some(&TypedVariable::String("not-a-number".into())));
    }

    #[test]
    fn answer_da_maps_to_ok() {
        let result = activity_answer_variable("Act_1", true, Some("ДА")).unwrap();
        assert_eq!(result, ("Act_1".to_string(), TypedVariable::String("ok".into())));
    }

    #[test]
    fn answer_net_maps_to_no() {
        let result = activity_answer_variable("Act_1", true, Some("НЕТ")).unwrap();
        assert_eq!(result.1, TypedVariable::String("no".into()));
    }

    #[test]
    fn unrecognized_answer_text_defaults_to_no() {
        let result = activity_answer_variable("Act_1", true, Some("???")).unwrap();
        assert_eq!(result.1, TypedVariable::String("no".into()));
    }

    #[test]
    fn missing_answer_text_defaults_to_no() {
        let result = activity_answer_variable("Act_1", true, None).unwrap();
        assert_eq!(result.1, TypedVariable::String("no".into()));
    }

    #[test]
    fn result_not_expected_omits_activity_variable_entirely() {
        assert_eq!(activity_answer_variable("Act_1", false, Some("ДА")), None);
    }

    #[test]
    fn result_not_expected_keeps_activity_variable_out_of_merged_map() {
        let original = VariableMap::new();
        let vars = build_engine_variables(&original, &serde_json::json!({}), "Act_1", false, None);
        assert!(!vars.contains_key("Act_1"));
    }

    #[test]
    fn existing_activity_variable_is_never_overwritten() {
        let mut original = VariableMap::new();
        original.insert("Act_1".to_string(), TypedVariable::String("preexisting".into()));
        let vars = build_engine_variables(&original, &serde_json::json!({}), "Act_1", true, Some("ДА"));
        assert_eq!(vars.get("Act_1"), Some(&TypedVariable::String("preexisting".into())));
    }
}
