//! Diagram element properties lookup (process-variables description
//! block, spec §4.2 step 4c) and responsible/predecessor resolution
//! (spec §4.2 step 2 fallback, step 5).

use exchanger_downstream_client::{DiagramProperty, DownstreamClient, ResponsibleInfo};
use exchanger_shared::VariableMap;

use crate::error::TaskCreatorError;
use crate::variable_text::variable_display_text;

pub async fn responsible_info(
    client: &DownstreamClient,
    process_definition_id: &str,
    activity_id: &str,
) -> Result<ResponsibleInfo, TaskCreatorError> {
    Ok(client.get_responsible_info(process_definition_id, activity_id).await?)
}

pub async fn diagram_properties(
    client: &DownstreamClient,
    process_definition_id: &str,
    activity_id: &str,
) -> Result<Vec<DiagramProperty>, TaskCreatorError> {
    Ok(client.get_diagram_properties(process_definition_id, activity_id).await?)
}

/// Renders the process-variables description block (spec §4.2 step 4c):
/// configured property names, sorted by `SORT`, with values read from the
/// process' variable bag. A configured property with no matching
/// variable is rendered with a placeholder rather than silently dropped,
/// so operators can see every property the template declared.
pub fn render_process_variables_block(properties: &[DiagramProperty], process_variables: &VariableMap) -> String {
    let mut sorted = properties.to_vec();
    sorted.sort_by_key(|p| p.sort);
    sorted
        .into_iter()
        .map(|property| {
            let value = process_variables
                .get(&property.name)
                .map(variable_display_text)
                .unwrap_or_else(|| "-".to_string());
            format!("• {}: {value}", property.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
