//! Observer registration and isolated event delivery
//!
//! Every observer gets its own bounded queue and delivery thread. Dispatching
//! only enqueues, so a slow observer never stalls the poll loop; when its
//! queue is full, further events for it are dropped with a warning. A panic
//! in one observer is caught on its own thread without affecting the others.

use super::SupervisionEvent;
use crate::error::{EipAgentError, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

/// Events queued per observer before new ones are dropped
pub const OBSERVER_QUEUE_CAPACITY: usize = 64;

/// Consumer of supervision events
pub trait Observer: Send + Sync + 'static {
    /// Handle one event
    fn notify(&self, event: &SupervisionEvent);
}

impl<F> Observer for F
where
    F: Fn(&SupervisionEvent) + Send + Sync + 'static,
{
    fn notify(&self, event: &SupervisionEvent) {
        self(event)
    }
}

struct Delivery {
    name: String,
    sender: mpsc::SyncSender<SupervisionEvent>,
}

/// Set of observers with one delivery thread each
///
/// Dropping the set closes every channel; delivery threads drain what is
/// already queued and exit.
#[derive(Default)]
pub struct ObserverSet {
    deliveries: Vec<Delivery>,
}

impl ObserverSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer and start its delivery thread
    pub fn register(&mut self, name: impl Into<String>, observer: Arc<dyn Observer>) -> Result<()> {
        let name = name.into();
        let (sender, receiver) = mpsc::sync_channel::<SupervisionEvent>(OBSERVER_QUEUE_CAPACITY);

        let thread_name = name.clone();
        thread::Builder::new()
            .name(format!("observer-{}", name))
            .spawn(move || {
                for event in receiver {
                    let delivered =
                        panic::catch_unwind(AssertUnwindSafe(|| observer.notify(&event)));
                    if delivered.is_err() {
                        error!("Observer '{}' panicked while handling {}", thread_name, event.kind);
                    }
                }
                debug!("Observer '{}' delivery finished", thread_name);
            })
            .map_err(|e| {
                EipAgentError::Platform(format!(
                    "Failed to start delivery thread for observer '{}': {}",
                    name, e
                ))
            })?;

        self.deliveries.push(Delivery { name, sender });
        Ok(())
    }

    /// Queue an event for every observer
    pub fn dispatch(&self, event: &SupervisionEvent) {
        for delivery in &self.deliveries {
            match delivery.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::TrySendError::Full(_)) => warn!(
                    "Observer '{}' queue is full, dropping {} event",
                    delivery.name, event.kind
                ),
                Err(mpsc::TrySendError::Disconnected(_)) => {
                    warn!("Observer '{}' is no longer receiving events", delivery.name)
                }
            }
        }
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    /// Whether no observer is registered
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }
}
