use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid queue name {name:?}: {reason}")]
    InvalidQueueName { name: String, reason: String },

    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),

    #[error("queue {0} not declared")]
    QueueNotDeclared(String),
}

impl MessagingError {
    /// Connectivity-shaped failures are recoverable with loop-local
    /// backoff (spec §7); protocol/validation errors are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MessagingError::Amqp(_))
    }
}
