//! Configuration loading (spec §6, §9: "Globals for config and handlers" →
//! an immutable `AppConfig` value constructed once at startup and injected
//! into each component).
//!
//! Layering: `config/default.toml` < `config/{env}.toml` <
//! `EXCHANGER__SECTION__KEY` environment overrides. The environment name
//! itself comes from `EXCHANGER_ENV` (default `dev`).

mod lock;

pub use lock::InstanceLock;

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Base directory; logs are written under `{base_dir}/logs/{env}/`.
    pub base_dir: String,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LogConfig {
    pub fn log_dir(&self, environment: &str) -> std::path::PathBuf {
        std::path::Path::new(&self.base_dir)
            .join("logs")
            .join(environment)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqConfig {
    pub amqp_url: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_responses_queue")]
    pub responses_queue: String,
    #[serde(default = "default_errors_queue")]
    pub errors_queue: String,
}

fn default_exchange() -> String {
    "exchanger.topics".to_string()
}
fn default_responses_queue() -> String {
    "responses.queue".to_string()
}
fn default_errors_queue() -> String {
    "errors.queue".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub base_url: String,
    #[serde(default = "default_engine_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_engine_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownstreamConfig {
    pub webhook_url: String,
    #[serde(default = "default_downstream_timeout_ms")]
    pub request_timeout_ms: u64,
    /// `{resultAnswer id → human label}` used by the Tracker (spec §4.3,
    /// SPEC_FULL supplement: `uf_result_answer_mapping` in the original).
    #[serde(default)]
    pub result_answer_mapping: HashMap<String, String>,
    #[serde(default = "default_priority")]
    pub default_priority: i64,
}

fn default_downstream_timeout_ms() -> u64 {
    30_000
}
fn default_priority() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_size")]
    pub max_entries: u64,
    #[serde(default = "default_negative_ttl_secs")]
    pub negative_ttl_seconds: u64,
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_cache_size() -> u64 {
    150
}
fn default_negative_ttl_secs() -> u64 {
    5 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl_secs(),
            max_entries: default_cache_size(),
            negative_ttl_seconds: default_negative_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    #[serde(default = "default_max_tasks")]
    pub max_tasks: u32,
    #[serde(default = "default_lock_duration_ms")]
    pub lock_duration_ms: u64,
    #[serde(default = "default_async_response_timeout_ms")]
    pub async_response_timeout_ms: u64,
}

fn default_max_tasks() -> u32 {
    10
}
fn default_lock_duration_ms() -> u64 {
    60_000
}
fn default_async_response_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
    #[serde(default = "default_sleep_seconds")]
    pub sleep_seconds: u64,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_response_batch")]
    pub response_batch_size: u32,
}

fn default_sleep_seconds() -> u64 {
    2
}
fn default_max_consecutive_errors() -> u32 {
    5
}
fn default_heartbeat_ms() -> u64 {
    1_000
}
fn default_response_batch() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskCreatorConfig {
    #[serde(default)]
    pub queues: Vec<String>,
    /// Name of the downstream system this process creates tasks in,
    /// used to address its dedicated sent-queue (spec §4.5).
    #[serde(default = "default_downstream_system")]
    pub downstream_system: String,
    #[serde(default = "default_sent_publish_retries")]
    pub sent_publish_max_retries: u32,
}

fn default_downstream_system() -> String {
    "bitrix".to_string()
}

fn default_sent_publish_retries() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub sent_queues: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_completed_statuses")]
    pub completed_statuses: Vec<String>,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}
fn default_batch_size() -> u32 {
    50
}
fn default_completed_statuses() -> Vec<String> {
    vec!["4".to_string(), "5".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
    pub log: LogConfig,
    pub mq: MqConfig,
    pub engine: EngineConfig,
    pub downstream: DownstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub task_creator: TaskCreatorConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

fn default_environment() -> String {
    "dev".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            sleep_seconds: default_sleep_seconds(),
            max_consecutive_errors: default_max_consecutive_errors(),
            heartbeat_ms: default_heartbeat_ms(),
            response_batch_size: default_response_batch(),
        }
    }
}

impl Default for TaskCreatorConfig {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            downstream_system: default_downstream_system(),
            sent_publish_max_retries: default_sent_publish_retries(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sent_queues: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            completed_statuses: default_completed_statuses(),
        }
    }
}

/// Loads `AppConfig` by layering `config_dir/default.toml`,
/// `config_dir/{env}.toml`, and `EXCHANGER__SECTION__KEY` env overrides.
/// The environment name comes from `EXCHANGER_ENV` unless `env_override`
/// is given (used by tests and CLI `--env`).
pub fn load(config_dir: &str, env_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let environment = env_override
        .map(str::to_string)
        .or_else(|| std::env::var("EXCHANGER_ENV").ok())
        .unwrap_or_else(default_environment);

    let builder = config::Config::builder()
        .add_source(config::File::with_name(&format!("{config_dir}/default")).required(false))
        .add_source(
            config::File::with_name(&format!("{config_dir}/{environment}")).required(false),
        )
        .set_override("environment", environment.clone())?
        .add_source(
            config::Environment::with_prefix("EXCHANGER")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    Ok(config.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_dir_nests_under_environment() {
        let cfg = LogConfig {
            base_dir: "/var/exchanger".into(),
            level: "info".into(),
            json: false,
        };
        assert_eq!(
            cfg.log_dir("prod"),
            std::path::PathBuf::from("/var/exchanger/logs/prod")
        );
    }

    #[test]
    fn tracker_default_completed_statuses_matches_source_system() {
        let cfg = TrackerConfig::default();
        assert_eq!(cfg.completed_statuses, vec!["4", "5"]);
    }

    #[test]
    fn load_falls_back_to_dev_environment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
            [log]
            base_dir = "/tmp/exchanger"
            [mq]
            amqp_url = "amqp://localhost"
            [engine]
            base_url = "http://engine.local"
            [downstream]
            webhook_url = "http://downstream.local/webhook"
            "#,
        )
        .unwrap();

        // Safe: single-threaded test process, no concurrent env mutation.
        unsafe {
            std::env::remove_var("EXCHANGER_ENV");
        }
        let cfg = load(dir.path().to_str().unwrap(), None).unwrap();
        assert_eq!(cfg.environment, "dev");
        assert_eq!(cfg.mq.amqp_url, "amqp://localhost");
    }

    #[test]
    fn load_honors_explicit_env_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
            [log]
            base_dir = "/tmp/exchanger"
            [mq]
            amqp_url = "amqp://localhost"
            [engine]
            base_url = "http://engine.local"
            [downstream]
            webhook_url = "http://downstream.local/webhook"
            "#,
        )
        .unwrap();

        let cfg = load(dir.path().to_str().unwrap(), Some("staging")).unwrap();
        assert_eq!(cfg.environment, "staging");
    }
}
