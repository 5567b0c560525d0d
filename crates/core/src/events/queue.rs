//! Multi-worker event queue.
//!
//! Events are routed to a worker by entity, so two events for the same site
//! or glidein are always handled one after the other and in the order they
//! were added. Events for different entities run concurrently.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::types::{EntityKind, Event};
use crate::metrics;

/// Capacity of the observer channel returned by [`EventQueue::subscribe`].
const TAP_CAPACITY: usize = 1024;

/// Executes one event against its target entity.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event);
}

/// Cheap, cloneable handle used to add events.
#[derive(Clone)]
pub struct EventQueue {
    senders: Arc<Vec<mpsc::UnboundedSender<Event>>>,
    tap: broadcast::Sender<Event>,
}

/// Worker-side ends of the queue, consumed by [`spawn_workers`].
pub struct QueueReceivers(Vec<mpsc::UnboundedReceiver<Event>>);

impl EventQueue {
    pub fn new(workers: usize) -> (Self, QueueReceivers) {
        let workers = workers.max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..workers).map(|_| mpsc::unbounded_channel()).unzip();
        let (tap, _) = broadcast::channel(TAP_CAPACITY);
        (
            Self {
                senders: Arc::new(senders),
                tap,
            },
            QueueReceivers(receivers),
        )
    }

    pub fn width(&self) -> usize {
        self.senders.len()
    }

    /// Queue an event. Never blocks; events added after shutdown are dropped.
    pub fn add(&self, event: impl Into<Event>) {
        let event = event.into();
        let worker = self.worker_for(event.kind(), event.entity_id());
        debug!(
            "Queueing {} for {} {} on worker {}",
            event.code_str(),
            event.kind(),
            event.entity_id(),
            worker
        );
        let _ = self.tap.send(event.clone());
        if self.senders[worker].send(event).is_err() {
            error!("Event queue is closed, dropping event");
        }
    }

    /// Observe every event as it is added.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tap.subscribe()
    }

    fn worker_for(&self, kind: EntityKind, id: i64) -> usize {
        let slot = (id as u64).wrapping_mul(2).wrapping_add(match kind {
            EntityKind::Site => 0,
            EntityKind::Glidein => 1,
        });
        (slot % self.senders.len() as u64) as usize
    }
}

/// Start one task per queue partition.
pub fn spawn_workers(
    receivers: QueueReceivers,
    handler: Arc<dyn EventHandler>,
    shutdown_tx: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    receivers
        .0
        .into_iter()
        .enumerate()
        .map(|(index, rx)| {
            tokio::spawn(run_worker(
                index,
                rx,
                Arc::clone(&handler),
                shutdown_tx.subscribe(),
            ))
        })
        .collect()
}

async fn run_worker(
    index: usize,
    mut rx: mpsc::UnboundedReceiver<Event>,
    handler: Arc<dyn EventHandler>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("Event worker {} started", index);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Event worker {} shutting down", index);
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    info!("Event worker {} channel closed", index);
                    break;
                };
                let kind = event.kind();
                metrics::EVENTS_DISPATCHED
                    .with_label_values(&[kind.as_str(), event.code_str()])
                    .inc();
                let started = Instant::now();
                handler.handle(event).await;
                metrics::EVENT_DURATION
                    .with_label_values(&[kind.as_str()])
                    .observe(started.elapsed().as_secs_f64());
            }
        }
    }
}
