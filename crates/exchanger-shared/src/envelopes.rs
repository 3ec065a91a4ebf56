//! Message envelopes exchanged over the bus (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::model::{DiagramElementMetadata, VariableMap};

/// Worker → system-queue. One per locked `ExternalTask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub task_id: String,
    pub topic: String,
    #[serde(default)]
    pub variables: VariableMap,
    pub process_instance_id: String,
    pub process_definition_id: String,
    pub process_definition_key: String,
    pub activity_id: String,
    #[serde(default)]
    pub activity_instance_id: Option<String>,
    pub worker_id: String,
    pub retries: Option<i32>,
    pub create_time: DateTime<Utc>,
    pub priority: i64,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub business_key: Option<String>,
    #[serde(default)]
    pub metadata: DiagramElementMetadata,
    #[serde(default)]
    pub process_variables: VariableMap,
}

/// Task-Creator → sent-queue. Carries the original message so the Tracker
/// (and any replay) has the full context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentEvent {
    pub original_queue: String,
    pub original_message: TaskPayload,
    pub response_data: JsonValue,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Completed,
    CompletedByTracker,
}

/// Tracker → responses-queue. The Worker is the only component allowed to
/// act on this (spec §4.3 design notes: linearizability at the engine
/// boundary is the Worker's responsibility alone).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub original_message: TaskPayload,
    pub response_data: JsonValue,
    pub processing_status: ProcessingStatus,
    pub processed_at: DateTime<Utc>,
}

/// Any component → errors-queue. Always carries the full original message
/// so an operator (or a replay tool) has enough context to act.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub timestamp: DateTime<Utc>,
    pub original_message: JsonValue,
    pub error_type: String,
    pub error_message: String,
    pub suggested_action: String,
}

impl ErrorEnvelope {
    pub fn new(
        original_message: JsonValue,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
        suggested_action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            original_message,
            error_type: error_type.into(),
            error_message: error_message.into(),
            suggested_action: suggested_action.into(),
        }
    }
}
