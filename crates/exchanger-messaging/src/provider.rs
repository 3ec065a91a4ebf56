//! Enum-dispatched transport, following the reference workspace's
//! `MessagingProvider` pattern: a plain enum instead of `Arc<dyn Trait>`,
//! since there are only ever two variants (a real broker connection and an
//! in-memory stand-in for tests) and the call sites don't need dynamic
//! extensibility.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

use crate::error::MessagingError;

/// A message pulled from a queue without auto-ack.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: u64,
    pub body: Vec<u8>,
}

#[derive(Debug)]
pub enum MessagingProvider {
    Lapin(LapinProvider),
    InMemory(InMemoryProvider),
}

impl MessagingProvider {
    pub async fn connect_lapin(amqp_url: &str) -> Result<Self, MessagingError> {
        let conn = Connection::connect(amqp_url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;
        Ok(Self::Lapin(LapinProvider {
            _connection: conn,
            channel,
        }))
    }

    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryProvider::new())
    }

    pub async fn declare_exchange(&self, exchange: &str) -> Result<(), MessagingError> {
        match self {
            Self::Lapin(p) => p.declare_exchange(exchange).await,
            Self::InMemory(p) => p.declare_exchange(exchange),
        }
    }

    pub async fn declare_queue(&self, queue: &str) -> Result<(), MessagingError> {
        match self {
            Self::Lapin(p) => p.declare_queue(queue).await,
            Self::InMemory(p) => p.declare_queue(queue),
        }
    }

    pub async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), MessagingError> {
        match self {
            Self::Lapin(p) => p.bind_queue(queue, exchange, routing_key).await,
            Self::InMemory(p) => p.bind_queue(queue, exchange, routing_key),
        }
    }

    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), MessagingError> {
        match self {
            Self::Lapin(p) => p.publish(exchange, routing_key, body).await,
            Self::InMemory(p) => p.publish(exchange, routing_key, body),
        }
    }

    /// Publishes directly to a queue, bypassing exchange routing (used for
    /// the per-downstream-system sent-queues and the responses/errors
    /// queues, which are addressed by name rather than topic routing key).
    pub async fn publish_to_queue(&self, queue: &str, body: &[u8]) -> Result<(), MessagingError> {
        match self {
            Self::Lapin(p) => p.publish_to_queue(queue, body).await,
            Self::InMemory(p) => p.publish_to_queue(queue, body),
        }
    }

    pub async fn basic_get(&self, queue: &str) -> Result<Option<Delivery>, MessagingError> {
        match self {
            Self::Lapin(p) => p.basic_get(queue).await,
            Self::InMemory(p) => p.basic_get(queue),
        }
    }

    pub async fn ack(&self, tag: u64) -> Result<(), MessagingError> {
        match self {
            Self::Lapin(p) => p.ack(tag).await,
            Self::InMemory(p) => p.ack(tag),
        }
    }

    pub async fn nack(&self, tag: u64, requeue: bool) -> Result<(), MessagingError> {
        match self {
            Self::Lapin(p) => p.nack(tag, requeue).await,
            Self::InMemory(p) => p.nack(tag, requeue),
        }
    }

    pub async fn queue_depth(&self, queue: &str) -> Result<u32, MessagingError> {
        match self {
            Self::Lapin(p) => p.queue_depth(queue).await,
            Self::InMemory(p) => Ok(p.queue_depth(queue)),
        }
    }
}

#[derive(Debug)]
pub struct LapinProvider {
    _connection: Connection,
    channel: Channel,
}

impl LapinProvider {
    async fn declare_exchange(&self, exchange: &str) -> Result<(), MessagingError> {
        self.channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), MessagingError> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), MessagingError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), MessagingError> {
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn publish_to_queue(&self, queue: &str, body: &[u8]) -> Result<(), MessagingError> {
        self.publish("", queue, body).await
    }

    async fn basic_get(&self, queue: &str) -> Result<Option<Delivery>, MessagingError> {
        let message = self
            .channel
            .basic_get(queue, BasicGetOptions { no_ack: false })
            .await?;
        Ok(message.map(|m| Delivery {
            tag: m.delivery_tag,
            body: m.data,
        }))
    }

    async fn ack(&self, tag: u64) -> Result<(), MessagingError> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), MessagingError> {
        self.channel
            .basic_nack(tag, BasicNackOptions { requeue, multiple: false })
            .await?;
        Ok(())
    }

    async fn queue_depth(&self, queue: &str) -> Result<u32, MessagingError> {
        let declared = self
            .channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(declared.message_count())
    }
}

/// An in-memory broker for unit tests that exercise queue semantics
/// (publish/get/ack/nack, routing, idempotent redelivery) without a live
/// RabbitMQ instance.
#[derive(Debug)]
pub struct InMemoryProvider {
    inner: Arc<InMemoryBroker>,
}

#[derive(Debug, Default)]
struct InMemoryBroker {
    exchanges: DashMap<String, ()>,
    queues: DashMap<String, std::sync::Mutex<VecDeque<Vec<u8>>>>,
    bindings: DashMap<String, Vec<String>>, // "exchange/routing_key" -> queues
    unacked: DashMap<u64, (String, Vec<u8>)>,
    next_tag: AtomicU64,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InMemoryBroker::default()),
        }
    }

    fn declare_exchange(&self, exchange: &str) -> Result<(), MessagingError> {
        self.inner.exchanges.insert(exchange.to_string(), ());
        Ok(())
    }

    fn declare_queue(&self, queue: &str) -> Result<(), MessagingError> {
        self.inner
            .queues
            .entry(queue.to_string())
            .or_insert_with(|| std::sync::Mutex::new(VecDeque::new()));
        Ok(())
    }

    fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<(), MessagingError> {
        let key = format!("{exchange}/{routing_key}");
        self.inner.bindings.entry(key).or_default().push(queue.to_string());
        Ok(())
    }

    fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<(), MessagingError> {
        if exchange.is_empty() {
            return self.publish_to_queue(routing_key, body);
        }
        let key = format!("{exchange}/{routing_key}");
        let Some(queues) = self.inner.bindings.get(&key) else {
            return Err(MessagingError::QueueNotDeclared(format!(
                "no binding for {key}"
            )));
        };
        for queue in queues.iter() {
            self.push_to_queue(queue, body)?;
        }
        Ok(())
    }

    fn publish_to_queue(&self, queue: &str, body: &[u8]) -> Result<(), MessagingError> {
        self.push_to_queue(queue, body)
    }

    fn push_to_queue(&self, queue: &str, body: &[u8]) -> Result<(), MessagingError> {
        let entry = self
            .inner
            .queues
            .get(queue)
            .ok_or_else(|| MessagingError::QueueNotDeclared(queue.to_string()))?;
        entry.lock().expect("in-memory queue mutex poisoned").push_back(body.to_vec());
        Ok(())
    }

    fn basic_get(&self, queue: &str) -> Result<Option<Delivery>, MessagingError> {
        let entry = self
            .inner
            .queues
            .get(queue)
            .ok_or_else(|| MessagingError::QueueNotDeclared(queue.to_string()))?;
        let mut q = entry.lock().expect("in-memory queue mutex poisoned");
        let Some(body) = q.pop_front() else {
            return Ok(None);
        };
        drop(q);
        let tag = self.inner.next_tag.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.unacked.insert(tag, (queue.to_string(), body.clone()));
        Ok(Some(Delivery { tag, body }))
    }

    fn ack(&self, tag: u64) -> Result<(), MessagingError> {
        self.inner
            .unacked
            .remove(&tag)
            .map(|_| ())
            .ok_or(MessagingError::UnknownDeliveryTag(tag))
    }

    fn nack(&self, tag: u64, requeue: bool) -> Result<(), MessagingError> {
        let (queue, body) = self
            .inner
            .unacked
            .remove(&tag)
            .map(|(_, v)| v)
            .ok_or(MessagingError::UnknownDeliveryTag(tag))?;
        if requeue {
            self.push_to_queue(&queue, &body)?;
        }
        Ok(())
    }

    fn queue_depth(&self, queue: &str) -> u32 {
        self.inner
            .queues
            .get(queue)
            .map(|q| q.lock().expect("in-memory queue mutex poisoned").len() as u32)
            .unwrap_or(0)
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_get_round_trips_via_exchange() {
        let provider = MessagingProvider::new_in_memory();
        provider.declare_exchange("ex").await.unwrap();
        provider.declare_queue("q1").await.unwrap();
        provider.bind_queue("q1", "ex", "rk").await.unwrap();

        provider.publish("ex", "rk", b"hello").await.unwrap();
        let delivery = provider.basic_get("q1").await.unwrap().unwrap();
        assert_eq!(delivery.body, b"hello");

        provider.ack(delivery.tag).await.unwrap();
        assert!(provider.basic_get("q1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nack_with_requeue_makes_message_visible_again() {
        let provider = MessagingProvider::new_in_memory();
        provider.declare_queue("q1").await.unwrap();
        provider.publish_to_queue("q1", b"payload").await.unwrap();

        let delivery = provider.basic_get("q1").await.unwrap().unwrap();
        provider.nack(delivery.tag, true).await.unwrap();

        let redelivered = provider.basic_get("q1").await.unwrap().unwrap();
        assert_eq!(redelivered.body, b"payload");
    }

    #[tokio::test]
    async fn nack_without_requeue_drops_message() {
        let provider = MessagingProvider::new_in_memory();
        provider.declare_queue("q1").await.unwrap();
        provider.publish_to_queue("q1", b"payload").await.unwrap();

        let delivery = provider.basic_get("q1").await.unwrap().unwrap();
        provider.nack(delivery.tag, false).await.unwrap();

        assert!(provider.basic_get("q1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publish_to_unbound_routing_key_is_an_error() {
        let provider = MessagingProvider::new_in_memory();
        provider.declare_exchange("ex").await.unwrap();
        let result = provider.publish("ex", "unbound", b"x").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn queue_depth_reflects_unconsumed_messages() {
        let provider = MessagingProvider::new_in_memory();
        provider.declare_queue("q1").await.unwrap();
        provider.publish_to_queue("q1", b"a").await.unwrap();
        provider.publish_to_queue("q1", b"b").await.unwrap();
        assert_eq!(provider.queue_depth("q1").await.unwrap(), 2);
    }
}
