//! Command queue seam and consumer loop.
//!
//! Commands arrive from a single ordered source per topic. The
//! consumer acknowledges a message only after its saga succeeded;
//! failed sagas are nacked and redelivered. The bus client itself is
//! an external collaborator; [`InMemoryQueue`] is the in-process
//! implementation used by the daemon's local mode and by tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, Notify};
use tracing::{error, info, warn};

use flowgate_core::CommandEnvelope;

use crate::error::SagaError;
use crate::orchestrator::Orchestrator;

/// A delivered command awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub receipt: u64,
    pub envelope: CommandEnvelope,
}

/// Ordered, acknowledgeable command source.
#[async_trait]
pub trait CommandQueue: Send + Sync {
    /// Enqueue a command (API ingest, sweeper repairs).
    async fn publish(&self, envelope: CommandEnvelope);

    /// Next message, or `None` once the queue is closed and drained.
    async fn receive(&self) -> Option<QueuedCommand>;

    /// The command was fully processed; never redeliver it.
    async fn ack(&self, receipt: u64);

    /// Processing failed; return the command for redelivery.
    async fn nack(&self, receipt: u64);
}

#[derive(Default)]
struct QueueInner {
    next_receipt: u64,
    ready: VecDeque<QueuedCommand>,
    in_flight: HashMap<u64, CommandEnvelope>,
    closed: bool,
}

/// In-process command queue with redelivery on nack.
#[derive(Default)]
pub struct InMemoryQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Close the queue; `receive` returns `None` once drained.
    pub async fn close(&self) {
        self.inner.lock().await.closed = true;
        self.notify.notify_one();
    }

    /// Messages waiting for delivery (diagnostics and tests).
    pub async fn ready_len(&self) -> usize {
        self.inner.lock().await.ready.len()
    }
}

#[async_trait]
impl CommandQueue for InMemoryQueue {
    async fn publish(&self, envelope: CommandEnvelope) {
        let mut inner = self.inner.lock().await;
        let receipt = inner.next_receipt;
        inner.next_receipt += 1;
        inner.ready.push_back(QueuedCommand { receipt, envelope });
        drop(inner);
        // notify_one stores a permit, so a publish that lands between
        // the consumer's empty-check and its await is not lost.
        self.notify.notify_one();
    }

    async fn receive(&self) -> Option<QueuedCommand> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(msg) = inner.ready.pop_front() {
                    inner.in_flight.insert(msg.receipt, msg.envelope.clone());
                    return Some(msg);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    async fn ack(&self, receipt: u64) {
        self.inner.lock().await.in_flight.remove(&receipt);
    }

    async fn nack(&self, receipt: u64) {
        let mut inner = self.inner.lock().await;
        if let Some(envelope) = inner.in_flight.remove(&receipt) {
            // Redeliver ahead of newer messages to preserve ordering.
            inner.ready.push_front(QueuedCommand { receipt, envelope });
            drop(inner);
            self.notify.notify_one();
        }
    }
}

/// Drive sagas from the queue until shutdown or queue close.
///
/// One message at a time: a success is acknowledged before the next
/// message is pulled. Malformed commands are acknowledged and dropped
/// (redelivery cannot repair them); everything else is nacked for
/// redelivery.
pub async fn run_consumer(
    orchestrator: Arc<Orchestrator>,
    queue: Arc<dyn CommandQueue>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            msg = queue.receive() => {
                let Some(msg) = msg else { break };
                match orchestrator.handle_envelope(msg.envelope.clone()).await {
                    Ok(()) => queue.ack(msg.receipt).await,
                    Err(err @ SagaError::Command(_)) => {
                        warn!(error = %err, "dropping unusable command");
                        queue.ack(msg.receipt).await;
                    }
                    Err(err) => {
                        error!(error = %err, vid = %msg.envelope.id, "saga failed, leaving command for redelivery");
                        queue.nack(msg.receipt).await;
                    }
                }
            }
        }
    }
    info!("command consumer stopped");
}
