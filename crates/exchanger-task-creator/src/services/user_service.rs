//! User display-name and supervisor lookups, used by field derivation
//! (spec §4.2.1) and questionnaire rendering (spec §4.2.3).

use exchanger_downstream_client::DownstreamClient;

use crate::error::TaskCreatorError;

/// Resolves a user's supervisor, returning `None` on a missing mapping
/// rather than erroring — absence is a normal outcome of the §4.2.1
/// cascade, not a fault.
pub async fn supervisor_of(client: &DownstreamClient, user_id: i64) -> Result<Option<i64>, TaskCreatorError> {
    Ok(client.get_user_supervisor(user_id).await?)
}

/// Display name for rendering a `user`-typed questionnaire answer (spec
/// §4.2.3): falls back to the raw id string on any lookup failure, never
/// propagating the error (best-effort, per spec §7).
pub async fn display_name_or_id(client: &DownstreamClient, user_id: i64) -> String {
    match client.get_user_name(user_id).await {
        Ok(Some(name)) => name,
        _ => user_id.to_string(),
    }
}
