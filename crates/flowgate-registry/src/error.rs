//! Registry error types.

use thiserror::Error;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Expected control flow for idempotent callers, not a failure.
    #[error("tenant has no shard assignment: {0}")]
    TenantNotAssigned(String),

    #[error("registry store error: {0}")]
    State(#[from] flowgate_state::StateError),
}
