//! flowgate-engine — HTTP clients for the remote collaborators.
//!
//! The workflow engine owns deployment existence and content; this
//! crate only speaks its REST surface and never caches engine state.
//! The incident and process-IO variable services are separate
//! collaborators with a shared deletion contract: removing records
//! that are already absent is success.

pub mod client;
pub mod error;
pub mod incident;
pub mod types;
pub mod variables;

pub use client::{CreateDeployment, EngineClient, EngineClientPool};
pub use error::{EngineError, EngineResult};
pub use incident::IncidentClient;
pub use types::*;
pub use variables::VariablesClient;
