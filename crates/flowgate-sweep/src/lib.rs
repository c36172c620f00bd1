//! flowgate-sweep — reconciliation between registries and engine state.
//!
//! Drift is not an error class: partial saga failures and crashes
//! leave vids without deployments and deployments without vids by
//! design, and this crate finds and repairs both. Every scan carries
//! an age buffer so a sweep can run concurrently with live traffic
//! without racing an in-flight create.

pub mod error;
pub mod migrate;
pub mod sweeper;

pub use error::{SweepError, SweepResult};
pub use migrate::{discover_assignments, MigrationReport};
pub use sweeper::Sweeper;
