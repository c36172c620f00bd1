//! Saga error types.

use thiserror::Error;

/// Result type alias for saga operations.
pub type SagaResult<T> = Result<T, SagaError>;

/// Errors that can occur while driving a deployment saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The command envelope itself is unusable. Consumers acknowledge
    /// these instead of retrying; redelivery cannot fix a malformed
    /// command.
    #[error("invalid command: {0}")]
    Command(#[from] flowgate_core::command::CommandError),

    #[error("registry error: {0}")]
    Registry(#[from] flowgate_registry::RegistryError),

    #[error("engine error: {0}")]
    Engine(#[from] flowgate_engine::EngineError),
}

impl SagaError {
    /// Whether redelivering the command could possibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SagaError::Command(_))
    }
}
