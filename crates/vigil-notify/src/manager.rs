//! Notification fan-out.
//!
//! `emit` is fire-and-forget for the caller: the event is built, the
//! filter consulted, and the event queued for a dispatcher task that
//! was spawned at construction. The control loop therefore never waits
//! on a slow webhook, while sinks still observe events in emission
//! order. Within one event every sink gets its own task and its own
//! deadline, so one wedged sink cannot fail the rest; failures are
//! logged and dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::event::{Event, EventFilter, EventType};

/// How long a single sink gets to deliver one event.
pub const SINK_DEADLINE: Duration = Duration::from_secs(10);

/// Delivery failure reported by a sink.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// A notification destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Service name used in logs (e.g. `"log"`, `"discord"`).
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &Event) -> Result<(), NotifyError>;
}

/// Identity stamped onto every emitted event.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub validator_name: String,
    pub cluster: String,
    pub public_ip: String,
    pub active_pubkey: String,
    pub passive_pubkey: String,
}

/// Fans events out to the registered sinks.
pub struct NotifyManager {
    tx: mpsc::UnboundedSender<Arc<Event>>,
    filter: EventFilter,
    context: EventContext,
    inflight: Arc<AtomicUsize>,
    done: Arc<Notify>,
}

impl NotifyManager {
    /// Builds the manager and spawns its dispatcher task.
    ///
    /// Must be called from within a tokio runtime. The dispatcher ends
    /// when the manager is dropped. `cancel` is raced against every
    /// sink delivery, so shutdown never waits out a wedged sink's full
    /// deadline; a delivery that is already ready still completes.
    pub fn new(
        context: EventContext,
        filter: EventFilter,
        sinks: Vec<Arc<dyn Notifier>>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<Event>>();
        let inflight = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Notify::new());

        let worker_inflight = Arc::clone(&inflight);
        let worker_done = Arc::clone(&done);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                dispatch(&sinks, event, &cancel).await;
                worker_inflight.fetch_sub(1, Ordering::SeqCst);
                worker_done.notify_one();
            }
        });

        Self {
            tx,
            filter,
            context,
            inflight,
            done,
        }
    }

    /// Builds and queues an event. Returns immediately; delivery
    /// happens on the dispatcher task.
    pub fn emit(
        &self,
        kind: EventType,
        message: impl Into<String>,
        details: BTreeMap<String, String>,
    ) {
        if !self.filter.allows(kind) {
            debug!(event = %kind, "event type disabled, skipping notification");
            return;
        }

        let event = Arc::new(Event {
            kind,
            severity: kind.default_severity(),
            timestamp: Utc::now(),
            validator_name: self.context.validator_name.clone(),
            cluster: self.context.cluster.clone(),
            public_ip: self.context.public_ip.clone(),
            active_pubkey: self.context.active_pubkey.clone(),
            passive_pubkey: self.context.passive_pubkey.clone(),
            message: message.into(),
            details,
        });

        self.inflight.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(event).is_err() {
            // dispatcher gone; only possible during shutdown
            self.inflight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Waits until every queued event has been dispatched.
    ///
    /// Used on shutdown so the final events are not lost to process
    /// exit; each sink is still bounded by [`SINK_DEADLINE`].
    pub async fn drain(&self) {
        loop {
            if self.inflight.load(Ordering::SeqCst) == 0 {
                return;
            }
            self.done.notified().await;
        }
    }
}

async fn dispatch(sinks: &[Arc<dyn Notifier>], event: Arc<Event>, cancel: &CancellationToken) {
    let mut deliveries = Vec::new();

    for sink in sinks {
        if !sink.is_enabled() {
            continue;
        }
        let sink = Arc::clone(sink);
        let event = Arc::clone(&event);
        let cancel = cancel.clone();
        deliveries.push(tokio::spawn(async move {
            // biased: an instant delivery (the log sink, a test channel)
            // still lands even when the token already fired; only a
            // pending send is abandoned
            tokio::select! {
                biased;

                result = tokio::time::timeout(SINK_DEADLINE, sink.send(&event)) => match result {
                    Ok(Ok(())) => {
                        debug!(sink = %sink.name(), event = %event.kind, "notification sent");
                    }
                    Ok(Err(e)) => {
                        error!(sink = %sink.name(), event = %event.kind, error = %e, "notification failed");
                    }
                    Err(_) => {
                        error!(sink = %sink.name(), event = %event.kind, "notification timed out");
                    }
                },

                _ = cancel.cancelled() => {
                    debug!(sink = %sink.name(), event = %event.kind, "notification cancelled");
                }
            }
        }));
    }

    for delivery in deliveries {
        let _ = delivery.await;
    }
}
