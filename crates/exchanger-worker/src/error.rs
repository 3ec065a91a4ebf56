use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("engine client error: {0}")]
    Engine(#[from] exchanger_engine_client::EngineClientError),

    #[error("messaging error: {0}")]
    Messaging(#[from] exchanger_messaging::MessagingError),

    #[error("bpmn cache error: {0}")]
    Cache(#[from] exchanger_bpmn_cache::BpmnCacheError),

    #[error("config error: {0}")]
    Config(#[from] exchanger_shared::ConfigError),

    #[error("publish failed after {attempts} attempts: {source}")]
    PublishExhausted {
        attempts: u32,
        #[source]
        source: exchanger_messaging::MessagingError,
    },
}

impl WorkerError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            WorkerError::Initialization(_) => false,
            WorkerError::Engine(e) => e.is_recoverable(),
            WorkerError::Messaging(e) => e.is_recoverable(),
            WorkerError::Cache(e) => e.is_recoverable(),
            WorkerError::Config(_) => false,
            WorkerError::PublishExhausted { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialization_error_is_not_recoverable() {
        let err = WorkerError::Initialization("mq handshake failed".into());
        assert!(!err.is_recoverable());
    }
}
