//! Error types for the Flowgate registry store.

use thiserror::Error;

/// Result type alias for registry store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during registry store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("no shard registered")]
    NoShards,

    #[error("shard not registered: {0}")]
    ShardNotFound(String),

    #[error("tenant has no shard assignment: {0}")]
    TenantNotAssigned(String),

    #[error("vid not found: {0}")]
    VidNotFound(String),

    #[error("vid {vid} maps to {actual}, not {expected}")]
    DidMismatch {
        vid: String,
        expected: String,
        actual: String,
    },

    #[error("deployment id {did} is already mapped to vid {vid}")]
    DidAlreadyMapped { did: String, vid: String },

    #[error("removal already pending for vid: {0}")]
    RemovalPending(String),

    #[error("no pending removal for vid: {0}")]
    PendingNotFound(String),
}
