//! Wires configuration into the MQ topology, downstream client, and one
//! poller per configured sent-queue, runs until an OS signal arrives
//! (spec §4.3, §5).

use std::time::Duration;

use exchanger_downstream_client::DownstreamClient;
use exchanger_messaging::{ExchangerRouter, MessageClient, MessagingProvider};
use exchanger_shared::config::AppConfig;
use tokio::sync::watch;

use crate::error::TrackerError;
use crate::health;
use crate::stats::Stats;
use crate::tracker_loop::run_tracker_loop;

pub struct TrackerService {
    config: AppConfig,
    health_port: u16,
}

impl TrackerService {
    pub fn new(config: AppConfig) -> Self {
        Self { config, health_port: 8080 }
    }

    pub fn with_health_port(mut self, port: u16) -> Self {
        self.health_port = port;
        self
    }

    pub async fn run(self) -> Result<(), TrackerError> {
        let downstream = DownstreamClient::new(
            &self.config.downstream.webhook_url,
            Duration::from_millis(self.config.downstream.request_timeout_ms),
        )
        .map_err(|e| TrackerError::Initialization(e.to_string()))?;

        let provider = MessagingProvider::connect_lapin(&self.config.mq.amqp_url)
            .await
            .map_err(|e| TrackerError::Initialization(e.to_string()))?;
        let router = ExchangerRouter::new(
            self.config.mq.exchange.clone(),
            self.config.mq.responses_queue.clone(),
            self.config.mq.errors_queue.clone(),
        );
        let messaging = MessageClient::new(provider, router);
        messaging
            .declare_infrastructure(&[], &self.config.tracker.sent_queues)
            .await?;

        let stats = std::sync::Arc::new(Stats::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        for system in self.config.tracker.sent_queues.clone() {
            handles.push(tokio::spawn(run_tracker_loop(
                system,
                downstream.clone(),
                messaging.clone(),
                self.config.tracker.batch_size,
                self.config.tracker.completed_statuses.clone(),
                self.config.downstream.result_answer_mapping.clone(),
                Duration::from_millis(self.config.tracker.poll_interval_ms),
                stats.clone(),
                shutdown_rx.clone(),
            )));
        }

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", self.health_port))
            .await
            .map_err(|e| TrackerError::Initialization(e.to_string()))?;
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
        tracing::info!("shutdown signal received, stopping tracker loops");
        let _ = shutdown_tx.send(true);

        for handle in handles {
            let _ = handle.await;
        }

        Ok(())
    }
}
