use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Identifier of a joined observer connection
pub type ConnectionId = u64;

/// Hub sizing.
///
/// Both queues are bounded. A full event queue drops the newest event, a
/// full observer outbox closes that observer.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Published events waiting for the dispatcher
    pub queue_capacity: usize,
    /// Events buffered per observer before it counts as unresponsive
    pub outbox_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            outbox_capacity: 64,
        }
    }
}

/// Lifecycle of an observer connection. There is no way back from Closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Handle returned by [`BroadcastHub::join`].
///
/// `outbox` yields every event published after the join, in publish order.
/// It ends once the hub closes the connection.
pub struct Observer {
    pub id: ConnectionId,
    pub outbox: mpsc::Receiver<Arc<str>>,
}

/// Delivery counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub published: u64,
    pub delivered: u64,
    pub dropped_events: u64,
    pub evicted: u64,
}

struct Shared {
    /// Open connections. Join, leave and delivery all go through this lock.
    connections: Mutex<HashMap<ConnectionId, mpsc::Sender<Arc<str>>>>,
    /// Ids handed out by `begin_connect` that have not opened yet
    pending: Mutex<HashSet<ConnectionId>>,
    next_id: AtomicU64,
    outbox_capacity: usize,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped_events: AtomicU64,
    evicted: AtomicU64,
}

impl Shared {
    fn connections(&self) -> MutexGuard<'_, HashMap<ConnectionId, mpsc::Sender<Arc<str>>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<ConnectionId>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A connection that has an id but is not yet in the delivery set.
///
/// Dropping it without calling [`BroadcastHub::open`] abandons the id, which
/// then reads as Closed.
pub struct PendingConnection {
    id: ConnectionId,
    shared: Arc<Shared>,
}

impl PendingConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for PendingConnection {
    fn drop(&mut self) {
        self.shared.pending().remove(&self.id);
    }
}

/// Set of observer connections plus the publish side of the event queue.
///
/// Cheap to clone; all clones share one connection set. The paired
/// [`Dispatcher`] must be running for events to reach observers.
#[derive(Clone)]
pub struct BroadcastHub {
    shared: Arc<Shared>,
    events_tx: mpsc::Sender<Arc<str>>,
}

/// Single serializing delivery path: drains the event queue one event at a
/// time and fans each out to every open connection.
pub struct Dispatcher {
    shared: Arc<Shared>,
    events_rx: mpsc::Receiver<Arc<str>>,
}

impl BroadcastHub {
    /// Create a hub and its dispatcher. Spawn [`Dispatcher::run`] once.
    pub fn new(config: HubConfig) -> (Self, Dispatcher) {
        let (events_tx, events_rx) = mpsc::channel(config.queue_capacity.max(1));
        let shared = Arc::new(Shared {
            connections: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
            outbox_capacity: config.outbox_capacity.max(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        });

        let hub = Self {
            shared: Arc::clone(&shared),
            events_tx,
        };
        let dispatcher = Dispatcher { shared, events_rx };
        (hub, dispatcher)
    }

    /// Allocate a connection id in the Connecting state.
    ///
    /// Receives nothing until passed to [`BroadcastHub::open`].
    pub fn begin_connect(&self) -> PendingConnection {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.pending().insert(id);
        debug!(connection_id = id, "Observer connecting");

        PendingConnection {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Register a new open connection in one step
    pub fn join(&self) -> Observer {
        self.open(self.begin_connect())
    }

    /// Move a pending connection to Open.
    ///
    /// The connection is in the delivery set before this returns, so any
    /// event published afterwards reaches it.
    pub fn open(&self, pending: PendingConnection) -> Observer {
        let id = pending.id;
        let (tx, rx) = mpsc::channel(self.shared.outbox_capacity);

        let total = {
            let mut connections = self.shared.connections();
            connections.insert(id, tx);
            connections.len()
        };

        drop(pending);

        info!(connection_id = id, connections = total, "Observer joined");
        Observer { id, outbox: rx }
    }

    /// Remove a connection. Unknown or already removed ids are a no-op.
    pub fn leave(&self, id: ConnectionId) {
        let (removed, total) = {
            let mut connections = self.shared.connections();
            let removed = connections.remove(&id).is_some();
            (removed, connections.len())
        };

        if removed {
            info!(connection_id = id, connections = total, "Observer left");
        }
    }

    /// Enqueue a payload for delivery to every joined connection.
    ///
    /// Never waits on observers. Returns false when the event was dropped
    /// because the queue is full or the dispatcher has stopped.
    pub fn publish(&self, payload: impl Into<Arc<str>>) -> bool {
        match self.events_tx.try_send(payload.into()) {
            Ok(()) => {
                self.shared.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.shared.dropped_events.fetch_add(1, Ordering::Relaxed);
                warn!("Broadcast queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.shared.dropped_events.fetch_add(1, Ordering::Relaxed);
                warn!("Broadcast dispatcher stopped, dropping event");
                false
            }
        }
    }

    /// Connecting until opened, Open while joined, Closed once left,
    /// evicted or abandoned
    pub fn connection_state(&self, id: ConnectionId) -> ConnectionState {
        if self.shared.connections().contains_key(&id) {
            ConnectionState::Open
        } else if self.shared.pending().contains(&id) {
            ConnectionState::Connecting
        } else {
            ConnectionState::Closed
        }
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections().len()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connection_count(),
            published: self.shared.published.load(Ordering::Relaxed),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            dropped_events: self.shared.dropped_events.load(Ordering::Relaxed),
            evicted: self.shared.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Dispatcher {
    /// Deliver events until every hub handle has been dropped
    pub async fn run(mut self) {
        info!("Broadcast dispatcher started");

        while let Some(event) = self.events_rx.recv().await {
            self.deliver(&event);
        }

        info!("Broadcast dispatcher stopped");
    }

    /// Hand one event to every open connection.
    ///
    /// A connection whose outbox is full or gone is closed and removed. The
    /// failure stays here and never reaches the publisher.
    pub(crate) fn deliver(&self, event: &Arc<str>) -> usize {
        let mut connections = self.shared.connections();
        let mut failed = Vec::new();
        let mut delivered = 0;

        for (&id, outbox) in connections.iter() {
            match outbox.try_send(Arc::clone(event)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(connection_id = id, "Observer not keeping up, closing connection");
                    failed.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection_id = id, "Observer gone, removing connection");
                    failed.push(id);
                }
            }
        }

        // Dropping the sender ends the observer's outbox
        for id in &failed {
            connections.remove(id);
        }
        drop(connections);

        self.shared
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.shared
            .evicted
            .fetch_add(failed.len() as u64, Ordering::Relaxed);

        debug!(delivered = delivered, evicted = failed.len(), "Event dispatched");
        delivered
    }
}
