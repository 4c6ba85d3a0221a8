use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("container runtime unreachable: {0}")]
    RuntimeUnreachable(String),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl HealthCheckError {
    pub fn config<M: Into<String>>(msg: M) -> Self {
        HealthCheckError::Configuration(msg.into())
    }

    /// Only configuration and invariant violations stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HealthCheckError::Configuration(_) | HealthCheckError::Invariant(_)
        )
    }

    /// Transient failures worth another attempt. A missing container is final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HealthCheckError::Network(_) | HealthCheckError::Timeout(_) | HealthCheckError::RuntimeUnreachable(_)
        )
    }
}

pub type CheckOutcome<T> = std::result::Result<T, HealthCheckError>;
