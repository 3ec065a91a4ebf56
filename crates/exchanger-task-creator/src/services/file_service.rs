//! Template-file attachment (spec §4.2 step 7a); predecessor-result-file
//! attachment lives in [`super::predecessor_service`] since it needs the
//! predecessor result fetch.

use exchanger_downstream_client::DownstreamClient;

/// Attaches every file id named by the template (spec §4.2 step 7a).
/// Best-effort: failures are logged and do not abort the already-created
/// task.
pub async fn attach_template_files(client: &DownstreamClient, task_id: &str, file_ids: &[i64]) {
    for file_id in file_ids {
        if let Err(err) = client.attach_file(task_id, *file_id).await {
            tracing::warn!(task_id, file_id, %err, "failed to attach template file");
        }
    }
}
