//! Queue-name routing, separated from the transport so naming conventions
//! can change without touching publish/consume call sites (same split the
//! reference workspace uses between `MessageRouter` and `MessagingProvider`).

use regex::Regex;

use crate::error::MessagingError;

fn validate_queue_name(name: &str) -> Result<(), MessagingError> {
    static PATTERN: &str = r"^[A-Za-z0-9._-]{1,255}$";
    let re = Regex::new(PATTERN).expect("static regex is valid");
    if re.is_match(name) {
        Ok(())
    } else {
        Err(MessagingError::InvalidQueueName {
            name: name.to_string(),
            reason: "must match [A-Za-z0-9._-]{1,255}".to_string(),
        })
    }
}

/// Routing conventions for the bridge's three queue families: per-topic
/// system queues, the single responses queue, the single errors queue, and
/// one sent-queue per configured downstream system (spec §4.5).
#[derive(Debug, Clone)]
pub struct ExchangerRouter {
    exchange: String,
    responses_queue: String,
    errors_queue: String,
}

impl ExchangerRouter {
    pub fn new(
        exchange: impl Into<String>,
        responses_queue: impl Into<String>,
        errors_queue: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            responses_queue: responses_queue.into(),
            errors_queue: errors_queue.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// The durable queue bound to a given engine topic, routed by the
    /// topic name itself.
    pub fn topic_queue(&self, topic: &str) -> Result<String, MessagingError> {
        let name = format!("topic.{topic}.queue");
        validate_queue_name(&name)?;
        Ok(name)
    }

    pub fn responses_queue(&self) -> String {
        self.responses_queue.clone()
    }

    pub fn errors_queue(&self) -> String {
        self.errors_queue.clone()
    }

    /// One sent-queue per downstream system name (e.g. `bitrix`).
    pub fn sent_queue(&self, system: &str) -> Result<String, MessagingError> {
        let name = format!("{system}.sent.queue");
        validate_queue_name(&name)?;
        Ok(name)
    }
}
