use exchanger_downstream_client::DownstreamClientError;
use exchanger_messaging::MessagingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error(transparent)]
    Downstream(#[from] DownstreamClientError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

impl TrackerError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            TrackerError::Initialization(_) => false,
            TrackerError::Downstream(e) => e.is_recoverable(),
            TrackerError::Messaging(e) => e.is_recoverable(),
        }
    }
}
