//! Sweep error types.

use thiserror::Error;

/// Result type alias for sweep operations.
pub type SweepResult<T> = Result<T, SweepError>;

/// Errors that can abort a sweep. Per-item repair failures are
/// logged and skipped instead of surfacing here.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("registry error: {0}")]
    Registry(#[from] flowgate_registry::RegistryError),

    #[error("engine error: {0}")]
    Engine(#[from] flowgate_engine::EngineError),
}
