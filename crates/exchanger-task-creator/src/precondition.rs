//! Startup precondition check (spec §6, testable property #10): the
//! downstream system must expose the required custom task fields with the
//! expected types before any queue message is consumed. Mirrors the
//! Python original's `_check_required_user_field` call inside `__init__`.

use std::collections::HashMap;

use exchanger_downstream_client::{DownstreamClient, UserFieldDescriptor};

use crate::error::TaskCreatorError;

const REQUIRED_FIELDS: &[(&str, &str)] = &[
    ("UF_CAMUNDA_ID_EXTERNAL_TASK", "string"),
    ("UF_RESULT_ANSWER", "enumeration"),
    ("UF_RESULT_QUESTION", "string"),
    ("UF_RESULT_EXPECTED", "boolean"),
    ("UF_ELEMENT_ID", "string"),
    ("UF_PROCESS_INSTANCE_ID", "string"),
];

pub async fn check(client: &DownstreamClient) -> Result<(), TaskCreatorError> {
    let fields = client.list_user_fields().await?;
    validate_fields(&fields)
}

fn validate_fields(fields: &[UserFieldDescriptor]) -> Result<(), TaskCreatorError> {
    let by_name: HashMap<&str, &str> =
        fields.iter().map(|f| (f.field_name.as_str(), f.user_type_id.as_str())).collect();

    for (name, expected_type) in REQUIRED_FIELDS {
        match by_name.get(name) {
            None => {
                return Err(TaskCreatorError::Precondition(format!(
                    "required custom field {name} is missing on the downstream task entity"
                )));
            }
            Some(actual) if actual != expected_type => {
                return Err(TaskCreatorError::Precondition(format!(
                    "required custom field {name} has type {actual}, expected {expected_type}"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
