use exchanger_bpmn_cache::BpmnCacheError;
use exchanger_downstream_client::DownstreamClientError;
use exchanger_engine_client::EngineClientError;
use exchanger_messaging::MessagingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskCreatorError {
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error(transparent)]
    Downstream(#[from] DownstreamClientError),

    #[error(transparent)]
    Engine(#[from] EngineClientError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Cache(#[from] BpmnCacheError),

    #[error(transparent)]
    Config(#[from] exchanger_shared::error::ConfigError),

    /// Required field missing before a downstream create call (spec §7
    /// Validation): aborts task creation before any HTTP call is made.
    #[error("validation failed before downstream create: {0}")]
    Validation(String),

    /// The downstream precondition check (spec §6) found a missing or
    /// wrongly-typed required custom field.
    #[error("downstream precondition check failed: {0}")]
    Precondition(String),
}

impl TaskCreatorError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            TaskCreatorError::Initialization(_) => false,
            TaskCreatorError::Downstream(e) => e.is_recoverable(),
            TaskCreatorError::Engine(e) => e.is_recoverable(),
            TaskCreatorError::Messaging(e) => e.is_recoverable(),
            TaskCreatorError::Cache(e) => e.is_recoverable(),
            TaskCreatorError::Config(_) => false,
            TaskCreatorError::Validation(_) => false,
            TaskCreatorError::Precondition(_) => false,
        }
    }
}
