use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::event::Event;

/// Receiver of supervisor events.
///
/// Each subscriber gets its own bounded queue and worker task, so a slow subscriber
/// never blocks the supervisor or other subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    fn name(&self) -> &'static str;

    fn queue_capacity(&self) -> usize {
        1024
    }
}

struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Fan-out of events to subscribers. Cheap to clone.
#[derive(Clone, Default)]
pub struct Bus {
    lanes: Arc<Vec<Lane>>,
    dropped: Arc<AtomicU64>,
}

/// Worker tasks of a [`Bus`]; they finish once every clone of the bus is dropped.
pub struct BusWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl Bus {
    /// Spawn one worker per subscriber. Must be called inside a tokio runtime.
    pub fn start(subscribers: Vec<Arc<dyn Subscribe>>) -> (Bus, BusWorkers) {
        let mut lanes = Vec::with_capacity(subscribers.len());
        let mut handles = Vec::with_capacity(subscribers.len());

        for sub in subscribers {
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            lanes.push(Lane {
                name: sub.name(),
                tx,
            });
            handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    sub.on_event(&event).await;
                }
                debug!(target: "warden::core", subscriber = sub.name(), "subscriber worker finished");
            }));
        }

        let bus = Bus {
            lanes: Arc::new(lanes),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (bus, BusWorkers { handles })
    }

    /// A bus without subscribers.
    pub fn disabled() -> Bus {
        Bus::default()
    }

    pub fn publish(&self, event: Event) {
        if self.lanes.is_empty() {
            return;
        }
        let event = Arc::new(event);
        for lane in self.lanes.iter() {
            match lane.tx.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        target: "warden::core",
                        subscriber = lane.name,
                        unit = %event.unit,
                        kind = ?event.kind,
                        "event dropped for a subscriber (queue full)"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(target: "warden::core", subscriber = lane.name, "subscriber queue closed");
                }
            }
        }
    }

    /// Number of events dropped because a subscriber queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl BusWorkers {
    /// Wait for every worker to drain its queue. Drop all [`Bus`] clones first.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(target: "warden::core", error = %e, "subscriber worker panicked");
            }
        }
    }
}
