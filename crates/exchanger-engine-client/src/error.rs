use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineClientError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("engine rejected the request: {status} {message}")]
    Protocol { status: u16, message: String },

    #[error("task {task_id} not found (already completed or lock expired)")]
    TaskGone { task_id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineClientError {
    /// Timeouts and connection failures are recoverable with loop-local
    /// backoff; a 404 on complete is treated as success by the caller, not
    /// as an error at all, so it never reaches here (see
    /// `EngineClient::complete`). 5xx responses and malformed payloads are
    /// not recoverable without operator intervention.
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineClientError::Http(e) => e.is_timeout() || e.is_connect(),
            EngineClientError::Protocol { status, .. } => *status >= 500,
            EngineClientError::TaskGone { .. } => false,
            EngineClientError::Serialization(_) => false,
        }
    }
}
