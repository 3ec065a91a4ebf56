//! Questionnaire-in-description rendering (spec §4.2.3) and questionnaire
//! attachment (spec §4.2 step 7d).

use exchanger_downstream_client::DownstreamClient;
use exchanger_shared::{Questionnaire, QuestionnaireQuestion, TypedVariable, VariableMap};

use super::user_service;
use crate::variable_text::variable_display_text;

/// Renders one questionnaire as a rich-text block: bold title, then one
/// `• {questionName}: {formattedAnswer}` line per question (spec §4.2.3).
pub async fn render_questionnaire_block(
    client: &DownstreamClient,
    questionnaire: &Questionnaire,
    process_variables: &VariableMap,
) -> String {
    let mut lines = vec![format!("[B]{}[/B]", questionnaire.title)];
    for question in &questionnaire.questions {
        let answer = find_answer_variable(process_variables, &questionnaire.code, &question.code);
        let formatted = format_answer(client, question, answer).await;
        lines.push(format!("• {}: {formatted}", question.name));
    }
    lines.join("\n")
}

/// Best-effort attachment of the template's questionnaires (spec §4.2
/// step 7d): failures are logged and do not abort the already-created
/// task.
pub async fn attach_questionnaires(client: &DownstreamClient, task_id: &str, questionnaires: &[Questionnaire]) {
    for questionnaire in questionnaires {
        if let Err(err) = client.add_questionnaire(task_id, &questionnaire.code).await {
            tracing::warn!(task_id, code = %questionnaire.code, %err, "failed to attach questionnaire");
        }
    }
}

/// Scans process variables for any key ending with
/// `_{questionnaireCode}_{questionCode}` (not prefix-bound: the same
/// questionnaire may be filled on an earlier step under a different
/// `elementId`).
fn find_answer_variable<'a>(
    vars: &'a VariableMap,
    questionnaire_code: &str,
    question_code: &str,
) -> Option<&'a TypedVariable> {
    let suffix = format!("_{questionnaire_code}_{question_code}");
    vars.iter().find(|(key, _)| key.ends_with(&suffix)).map(|(_, value)| value)
}

async fn format_answer(
    client: &DownstreamClient,
    question: &QuestionnaireQuestion,
    answer: Option<&TypedVariable>,
) -> String {
    match question.question_type.to_lowercase().as_str() {
        "boolean" => format_boolean(answer),
        "date" => format_date(answer),
        "user" => format_user(client, answer).await,
        "universal_list" => format_universal_list(client, question, answer).await,
        "integer" => format_integer(answer),
        _ => fallback_text(answer),
    }
}

fn format_boolean(answer: Option<&TypedVariable>) -> String {
    match answer {
        None | Some(TypedVariable::Null) => "-".to_string(),
        Some(TypedVariable::Boolean(b)) => if *b { "Да" } else { "Нет" }.to_string(),
        Some(other) => if is_truthy(other) { "Да" } else { "Нет" }.to_string(),
    }
}

fn is_truthy(value: &TypedVariable) -> bool {
    match value {
        TypedVariable::Boolean(b) => *b,
        TypedVariable::Long(n) => *n == 1,
        TypedVariable::String(s) => matches!(s.to_lowercase().as_str(), "true" | "1" | "y" | "yes" | "да"),
        _ => false,
    }
}

fn format_date(answer: Option<&TypedVariable>) -> String {
    match answer {
        Some(TypedVariable::Date(dt)) => dt.format("%d.%m.%Y").to_string(),
        Some(TypedVariable::String(s)) => parse_iso_date(s).unwrap_or_else(|| s.clone()),
        Some(other) => variable_display_text(other),
        None => "-".to_string(),
    }
}

fn parse_iso_date(raw: &str) -> Option<String> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.format("%d.%m.%Y").to_string())
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|d| d.format("%d.%m.%Y").to_string())
        })
        .ok()
}

async fn format_user(client: &DownstreamClient, answer: Option<&TypedVariable>) -> String {
    match answer.and_then(as_i64) {
        Some(user_id) => user_service::display_name_or_id(client, user_id).await,
        None => fallback_text(answer),
    }
}

async fn format_universal_list(
    client: &DownstreamClient,
    question: &QuestionnaireQuestion,
    answer: Option<&TypedVariable>,
) -> String {
    let iblock_id = question
        .options
        .as_ref()
        .and_then(|opts| opts.get("iblockId"))
        .and_then(|v| v.as_i64());
    let element_id = answer.and_then(as_str);

    match (iblock_id, element_id) {
        (Some(iblock_id), Some(element_id)) => match client.get_list_element_name(iblock_id, &element_id).await {
            Ok(Some(name)) => name,
            _ => element_id,
        },
        _ => fallback_text(answer),
    }
}

fn format_integer(answer: Option<&TypedVariable>) -> String {
    match answer.and_then(as_i64) {
        Some(n) => n.to_string(),
        None => fallback_text(answer),
    }
}

fn fallback_text(answer: Option<&TypedVariable>) -> String {
    answer.map(variable_display_text).unwrap_or_else(|| "-".to_string())
}

fn as_i64(value: &TypedVariable) -> Option<i64> {
    match value {
        TypedVariable::Long(n) => Some(*n),
        TypedVariable::String(s) => s.trim().parse().ok(),
        TypedVariable::Double(f) => Some(*f as i64),
        _ => None,
    }
}

fn as_str(value: &TypedVariable) -> Option<String> {
    match value {
        TypedVariable::String(s) => Some(s.clone()),
        TypedVariable::Long(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_null_answer_renders_as_placeholder() {
        assert_eq!(format_boolean(Some(&TypedVariable::Null)), "-");
        assert_eq!(format_boolean(None), "-");
    }

    #[test]
    fn boolean_true_renders_as_da() {
        assert_eq!(format_boolean(Some(&TypedVariable::Boolean(true))), "Да");
    }

    #[test]
    fn date_parses_date_only_iso_string() {
        assert_eq!(format_date(Some(&TypedVariable::String("2026-07-28".into()))), "28.07.2026");
    }

    #[test]
    fn date_parses_full_rfc3339_string() {
        assert_eq!(
            format_date(Some(&TypedVariable::String("2026-07-28T10:00:00Z".into()))),
            "28.07.2026"
        );
    }

    #[test]
    fn date_passes_through_on_parse_failure() {
        assert_eq!(format_date(Some(&TypedVariable::String("not-a-date".into()))), "not-a-date");
    }

    #[test]
    fn integer_passes_through_unparseable_text() {
        assert_eq!(format_integer(Some(&TypedVariable::String("abc".into()))), "abc");
    }

    #[test]
    fn finds_answer_by_suffix_regardless_of_activity_prefix() {
        let mut vars = VariableMap::new();
        vars.insert("Act_99_Q1_Q1A".into(), TypedVariable::Boolean(true));
        let found = find_answer_variable(&vars, "Q1", "Q1A");
        assert_eq!(found, Some(&TypedVariable::Boolean(true)));
    }
}
