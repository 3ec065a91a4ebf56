//! Shared error taxonomy (spec §7).
//!
//! Each crate boundary gets its own error enum with an `is_recoverable()`
//! classification method that loop-local retry logic can dispatch on,
//! mirroring the reference client's `ClientError`.

use thiserror::Error;

/// Errors raised by configuration loading and the single-instance lock.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("another instance is already running for environment {env} (lock at {path})")]
    AlreadyRunning { env: String, path: String },

    #[error("i/o error acquiring instance lock: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn missing_env_var(name: impl Into<String>) -> Self {
        Self::MissingEnvVar(name.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_var_formats_name() {
        let err = ConfigError::missing_env_var("EXCHANGER_ENV");
        assert_eq!(err.to_string(), "missing required environment variable: EXCHANGER_ENV");
    }

    #[test]
    fn already_running_includes_env_and_path() {
        let err = ConfigError::AlreadyRunning {
            env: "prod".into(),
            path: "/tmp/exchanger-task-creator-prod.lock".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("prod"));
        assert!(msg.contains("/tmp/exchanger-task-creator-prod.lock"));
    }
}
