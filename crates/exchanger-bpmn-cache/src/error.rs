use thiserror::Error;

#[derive(Debug, Error)]
pub enum BpmnCacheError {
    #[error("failed to fetch process xml: {0}")]
    Fetch(#[from] exchanger_engine_client::EngineClientError),

    #[error("malformed bpmn xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("activity {activity_id} not found in process definition {process_definition_id}")]
    ActivityNotFound {
        process_definition_id: String,
        activity_id: String,
    },

    /// A previous fetch/parse for this process definition failed and is
    /// still within its negative-cache window.
    #[error("process definition lookup previously failed: {0}")]
    Cached(String),
}

impl BpmnCacheError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            BpmnCacheError::Fetch(e) => e.is_recoverable(),
            BpmnCacheError::Xml(_) => false,
            BpmnCacheError::ActivityNotFound { .. } => false,
            BpmnCacheError::Cached(_) => false,
        }
    }
}
