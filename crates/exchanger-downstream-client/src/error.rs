use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownstreamClientError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("downstream system rejected the request: {error_code} {description}")]
    Protocol { error_code: String, description: String },

    /// The original task's responsible/assignee id did not resolve to a
    /// real user (spec §7's most important error subcategory).
    #[error("assignee id {assignee_id} not found in downstream system")]
    AssigneeNotFound { assignee_id: i64 },

    #[error("malformed response from downstream system: {0}")]
    MalformedResponse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DownstreamClientError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            DownstreamClientError::Http(e) => e.is_timeout() || e.is_connect(),
            DownstreamClientError::Protocol { .. } => false,
            DownstreamClientError::AssigneeNotFound { .. } => false,
            DownstreamClientError::MalformedResponse(_) => false,
            DownstreamClientError::Serialization(_) => false,
        }
    }

    /// Scans a downstream error description for the assignee/responsible
    /// "not found" pattern and reclassifies it, mirroring the Python
    /// original's response-text pattern matching in `_create_bitrix_task`.
    pub fn classify(error_code: String, description: String, assignee_id: Option<i64>) -> Self {
        let lower = description.to_lowercase();
        if let Some(id) = assignee_id {
            if lower.contains("не найден")
                && (lower.contains("исполнитель") || lower.contains("ответственный"))
            {
                return DownstreamClientError::AssigneeNotFound { assignee_id: id };
            }
        }
        DownstreamClientError::Protocol {
            error_code,
            description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_detects_assignee_not_found_pattern() {
        let err = DownstreamClientError::classify(
            "ACCESS_DENIED".into(),
            "Пользователь с ID 9999: Ответственный не найден".into(),
            Some(9999),
        );
        assert!(matches!(err, DownstreamClientError::AssigneeNotFound { assignee_id: 9999 }));
    }

    #[test]
    fn classify_falls_back_to_protocol_error_when_no_match() {
        let err = DownstreamClientError::classify("ACCESS_DENIED".into(), "no permission".into(), Some(1));
        assert!(matches!(err, DownstreamClientError::Protocol { .. }));
    }

    #[test]
    fn assignee_not_found_is_not_recoverable() {
        let err = DownstreamClientError::AssigneeNotFound { assignee_id: 1 };
        assert!(!err.is_recoverable());
    }
}
