//! Wires configuration into the MQ topology, engine client, cache, and
//! the fetch/response loops, then runs until an OS signal arrives (spec
//! §4.1 `start()`, §5 concurrency model).

use std::sync::Arc;
use std::time::Duration;

use exchanger_bpmn_cache::BpmnCache;
use exchanger_engine_client::EngineClient;
use exchanger_messaging::{ExchangerRouter, MessageClient, MessagingProvider};
use exchanger_shared::config::AppConfig;
use tokio::sync::watch;

use crate::error::WorkerError;
use crate::fetch_loop::run_fetch_loop;
use crate::health;
use crate::response_loop::run_response_loop;
use crate::stats::Stats;

pub struct WorkerService {
    config: AppConfig,
    worker_id: String,
    health_port: u16,
}

impl WorkerService {
    pub fn new(config: AppConfig) -> Self {
        let worker_id = format!("worker-{}", uuid::Uuid::now_v7());
        Self {
            config,
            worker_id,
            health_port: 8080,
        }
    }

    pub fn with_health_port(mut self, port: u16) -> Self {
        self.health_port = port;
        self
    }

    pub async fn run(self) -> Result<(), WorkerError> {
        let engine = EngineClient::new(
            &self.config.engine.base_url,
            Duration::from_millis(self.config.engine.request_timeout_ms),
        )
        .map_err(|e| WorkerError::Initialization(e.to_string()))?;
        let cache = BpmnCache::new(engine.clone(), &self.config.cache);

        let provider = MessagingProvider::connect_lapin(&self.config.mq.amqp_url)
            .await
            .map_err(|e| WorkerError::Initialization(e.to_string()))?;
        let router = ExchangerRouter::new(
            self.config.mq.exchange.clone(),
            self.config.mq.responses_queue.clone(),
            self.config.mq.errors_queue.clone(),
        );
        let messaging = MessageClient::new(provider, router);

        let topic_names: Vec<String> = self.config.worker.topics.iter().map(|t| t.name.clone()).collect();
        messaging.declare_infrastructure(&topic_names, &[]).await?;

        let stats = Arc::new(Stats::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        for topic in self.config.worker.topics.clone() {
            handles.push(tokio::spawn(run_fetch_loop(
                topic,
                self.worker_id.clone(),
                None,
                engine.clone(),
                cache.clone(),
                messaging.clone(),
                self.config.worker.sleep_seconds,
                self.config.worker.max_consecutive_errors,
                stats.clone(),
                shutdown_rx.clone(),
            )));
        }

        handles.push(tokio::spawn(run_response_loop(
            engine.clone(),
            messaging.clone(),
            self.config.worker.heartbeat_ms,
            self.config.worker.response_batch_size,
            stats.clone(),
            shutdown_rx.clone(),
        )));

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", self.health_port))
            .await
            .map_err(|e| WorkerError::Initialization(e.to_string()))?;
        let health_app = health::router(stats.clone());
        let mut health_shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            let server = axum::serve(listener, health_app).with_graceful_shutdown(async move {
                let _ = health_shutdown.changed().await;
            });
            if let Err(err) = server.await {
                tracing::error!(%err, "health endpoint server exited with an error");
            }
        }));

        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received, stopping worker loops");
        let _ = shutdown_tx.send(true);

        for handle in handles {
            let _ = handle.await;
        }

        Ok(())
    }
}
