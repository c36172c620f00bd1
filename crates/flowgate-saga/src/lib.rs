//! flowgate-saga — the deployment saga orchestrator.
//!
//! Consumes deployment commands and drives the shard registry, the
//! vid registry, the remote engine, and the auxiliary services
//! through multi-step sagas with explicit compensation on partial
//! failure. Redelivery (a handler that fails does not acknowledge)
//! plus idempotent sagas give the at-least-once correctness story;
//! anything a crash leaves behind is the sweeper's job.

pub mod error;
pub mod orchestrator;
pub mod queue;

pub use error::{SagaError, SagaResult};
pub use orchestrator::Orchestrator;
pub use queue::{run_consumer, CommandQueue, InMemoryQueue, QueuedCommand};
