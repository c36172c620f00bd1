//! flowgate-state — embedded registry store.
//!
//! Owns the two registry table families described in the data model:
//! the shard set with its tenant assignments, and the vid relation
//! with its reverse index and pending-removal markers. No other crate
//! writes to these tables directly.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::RegistryStore;
pub use types::*;
