//! Error types for the remote collaborator clients.

use thiserror::Error;

/// Result type alias for collaborator calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from the engine and auxiliary service clients.
///
/// `Rejected` is the engine refusing the document itself (4xx on the
/// create endpoint); the saga retries those once with a placeholder.
/// Everything else propagates and triggers compensation where one
/// exists.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine rejected the document ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected status {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl EngineError {
    /// True for the document-level create rejection, as opposed to a
    /// transport or server failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, EngineError::Rejected { .. })
    }
}
