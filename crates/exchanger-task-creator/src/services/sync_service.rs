//! The mandatory post-creation sync call (spec §4.2 step 9). Failure is
//! logged as CRITICAL but never unwinds the already-created task.

use exchanger_downstream_client::DownstreamClient;

pub async fn sync(client: &DownstreamClient, process_definition_key: &str, process_instance_id: &str) {
    if let Err(err) = client.sync(process_definition_key, process_instance_id).await {
        tracing::error!(
            process_definition_key,
            process_instance_id,
            %err,
            "CRITICAL: downstream sync call failed after task creation"
        );
    }
}
