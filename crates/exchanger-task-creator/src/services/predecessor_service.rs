//! Predecessor dependency resolution, result fetch, and results-block
//! rendering (spec §4.2 step 5, §4.2.5).

use exchanger_downstream_client::DownstreamClient;
use exchanger_shared::DownstreamTask;

use crate::error::TaskCreatorError;

/// Finds the existing downstream task for each predecessor element id
/// within the current process instance (spec §4.2 step 5). Predecessors
/// with no matching downstream task yet are skipped — they have not run,
/// or ran in a process instance we cannot see.
pub async fn find_predecessor_tasks(
    client: &DownstreamClient,
    predecessor_element_ids: &[String],
    process_instance_id: &str,
) -> Result<Vec<DownstreamTask>, TaskCreatorError> {
    let mut tasks = Vec::new();
    for element_id in predecessor_element_ids {
        match client.find_task_by_element_and_instance(element_id, process_instance_id).await? {
            Some(task) => tasks.push(task),
            None => tracing::warn!(element_id, process_instance_id, "predecessor task not found, skipping dependency"),
        }
    }
    Ok(tasks)
}

/// Calls the dedicated dependency-add endpoint once per predecessor
/// (idempotent downstream, spec §4.2 step 5).
pub async fn add_dependencies(client: &DownstreamClient, task_id: &str, predecessor_tasks: &[DownstreamTask]) {
    for predecessor in predecessor_tasks {
        if let Err(err) = client.add_dependency(task_id, &predecessor.id).await {
            tracing::warn!(task_id, predecessor_id = %predecessor.id, %err, "failed to register predecessor dependency");
        }
    }
}

/// Renders the predecessor-results block (spec §4.2.5):
/// `[B]Результаты предшествующих задач:[/B]` followed by per-predecessor
/// result text and attachment names.
pub async fn render_results_block(
    client: &DownstreamClient,
    predecessor_tasks: &[DownstreamTask],
) -> Result<String, TaskCreatorError> {
    if predecessor_tasks.is_empty() {
        return Ok(String::new());
    }

    let mut lines = vec!["[B]Результаты предшествующих задач:[/B]".to_string()];
    for predecessor in predecessor_tasks {
        lines.push(format!("[B]Задача №{}:[/B]", predecessor.id));
        let results = client.get_task_results(&predecessor.id).await?;
        for result in &results {
            lines.push(html_unescape(&result.text));
            if !result.attachments.is_empty() {
                let names = result.attachments.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ");
                lines.push(format!("Вложения: {names}"));
            }
        }
    }
    Ok(lines.join("\n"))
}

/// Best-effort attachment of every predecessor result's files to the new
/// task (spec §4.2.5, §4.2 step 7b).
pub async fn attach_result_files(client: &DownstreamClient, task_id: &str, predecessor_tasks: &[DownstreamTask]) {
    for predecessor in predecessor_tasks {
        let results = match client.get_task_results(&predecessor.id).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(task_id, predecessor_id = %predecessor.id, %err, "failed to fetch predecessor results");
                continue;
            }
        };
        for attachment in results.iter().flat_map(|r| r.attachments.iter()) {
            if let Err(err) = client.attach_file(task_id, attachment.file_id).await {
                tracing::warn!(task_id, file_id = attachment.file_id, %err, "failed to attach predecessor result file");
            }
        }
    }
}

fn html_unescape(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_unescape_decodes_common_entities() {
        assert_eq!(html_unescape("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
    }
}
