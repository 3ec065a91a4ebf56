//! Wires configuration into the MQ topology, downstream and engine
//! clients, and one consumer loop per configured queue, then runs the
//! startup precondition check and the loops until an OS signal arrives
//! (spec §4.2, §6).

use std::time::Duration;

use exchanger_downstream_client::DownstreamClient;
use exchanger_engine_client::EngineClient;
use exchanger_messaging::{ExchangerRouter, MessageClient, MessagingProvider};
use exchanger_shared::config::AppConfig;
use tokio::sync::watch;

use crate::creation_loop::run_creation_loop;
use crate::creator::Creator;
use crate::error::TaskCreatorError;
use crate::health;
use crate::precondition;
use crate::stats::Stats;

const IDLE_SLEEP: Duration = Duration::from_secs(2);
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

pub struct TaskCreatorService {
    config: AppConfig,
    health_port: u16,
}

impl TaskCreatorService {
    pub fn new(config: AppConfig) -> Self {
        Self { config, health_port: 8080 }
    }

    pub fn with_health_port(mut self, port: u16) -> Self {
        self.health_port = port;
        self
    }

    /// Runs the startup precondition check (spec §6) before any queue is
    /// consumed. Callers map failure to the process's exit code 1.
    pub async fn check_preconditions(&self) -> Result<(), TaskCreatorError> {
        let downstream = DownstreamClient::new(
            &self.config.downstream.webhook_url,
            Duration::from_millis(self.config.downstream.request_timeout_ms),
        )
        .map_err(|e| TaskCreatorError::Initialization(e.to_string()))?;
        precondition::check(&downstream).await
    }

    pub async fn run(self) -> Result<(), TaskCreatorError> {
        let downstream = DownstreamClient::new(
            &self.config.downstream.webhook_url,
            Duration::from_millis(self.config.downstream.request_timeout_ms),
        )
        .map_err(|e| TaskCreatorError::Initialization(e.to_string()))?;
        let engine = EngineClient::new(
            &self.config.engine.base_url,
            Duration::from_millis(self.config.engine.request_timeout_ms),
        )
        .map_err(|e| TaskCreatorError::Initialization(e.to_string()))?;

        let provider = MessagingProvider::connect_lapin(&self.config.mq.amqp_url)
            .await
            .map_err(|e| TaskCreatorError::Initialization(e.to_string()))?;
        let router = ExchangerRouter::new(
            self.config.mq.exchange.clone(),
            self.config.mq.responses_queue.clone(),
            self.config.mq.errors_queue.clone(),
        );
        let messaging = MessageClient::new(provider, router);
        messaging
            .declare_infrastructure(&self.config.task_creator.queues, &[self.config.task_creator.downstream_system.clone()])
            .await?;

        let creator = Creator::new(downstream, self.config.downstream.default_priority);
        let stats = std::sync::Arc::new(Stats::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        for queue in self.config.task_creator.queues.clone() {
            handles.push(tokio::spawn(run_creation_loop(
                queue,
                creator.clone(),
                engine.clone(),
                messaging.clone(),
                self.config.task_creator.downstream_system.clone(),
                self.config.task_creator.sent_publish_max_retries,
                MAX_CONSECUTIVE_ERRORS,
                IDLE_SLEEP,
                stats.clone(),
                shutdown_rx.clone(),
            )));
        }

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", self.health_port))
            .await
            .map_err(|e| TaskCreatorError::Initialization(e.to_string()))?;
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
        tracing::info!("shutdown signal received, stopping task-creator loops");
        let _ = shutdown_tx.send(true);

        for handle in handles {
            let _ = handle.await;
        }

        Ok(())
    }
}
