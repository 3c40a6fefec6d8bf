//! Segmented publish/subscribe bus for telemetry events
//!
//! Events fan out to three disjoint audiences: admin subscribers receive
//! everything, technician and customer subscribers only receive events for
//! their own scope id. Delivery is best-effort: each subscriber has a
//! bounded queue and a full queue drops the event for that subscriber
//! only, so a slow SSE client can never stall a publisher.

use crate::domain::Event;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Audience segment an event is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// All operators; scope id is ignored
    Admin,
    /// One technician, scoped by technician id
    Technician,
    /// One booking's customer, scoped by booking id
    Customer,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Admin => "admin",
            Audience::Technician => "technician",
            Audience::Customer => "customer",
        }
    }
}

/// Live subscription counts per audience
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BusStats {
    pub admin_clients: usize,
    pub technician_clients: usize,
    pub customer_clients: usize,
}

type ScopedSenders = FxHashMap<String, FxHashMap<Uuid, mpsc::Sender<Event>>>;

#[derive(Default)]
struct Registry {
    admin: FxHashMap<Uuid, mpsc::Sender<Event>>,
    technician: ScopedSenders,
    customer: ScopedSenders,
}

impl Registry {
    fn insert(&mut self, audience: Audience, scope: &str, id: Uuid, tx: mpsc::Sender<Event>) {
        match audience {
            Audience::Admin => {
                self.admin.insert(id, tx);
            }
            Audience::Technician => {
                self.technician.entry(scope.to_string()).or_default().insert(id, tx);
            }
            Audience::Customer => {
                self.customer.entry(scope.to_string()).or_default().insert(id, tx);
            }
        }
    }

    fn remove(&mut self, audience: Audience, scope: &str, id: Uuid) {
        match audience {
            Audience::Admin => {
                self.admin.remove(&id);
            }
            Audience::Technician => {
                if let Some(senders) = self.technician.get_mut(scope) {
                    senders.remove(&id);
                    if senders.is_empty() {
                        self.technician.remove(scope);
                    }
                }
            }
            Audience::Customer => {
                if let Some(senders) = self.customer.get_mut(scope) {
                    senders.remove(&id);
                    if senders.is_empty() {
                        self.customer.remove(scope);
                    }
                }
            }
        }
    }
}

/// In-process event broker with per-audience segments.
///
/// Construct one per process at startup and share it via `Arc`; tests
/// instantiate their own isolated instances.
pub struct EventBus {
    registry: Arc<RwLock<Registry>>,
    queue_capacity: usize,
}

impl EventBus {
    /// Default per-subscriber queue capacity
    pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

    pub fn new(queue_capacity: usize) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new subscriber on the given segment.
    ///
    /// The returned `Subscription` unregisters itself when dropped, which
    /// also closes the queue so a pending `recv` returns `None`.
    pub fn subscribe(&self, audience: Audience, scope: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = Uuid::now_v7();
        // Admin subscriptions are global; normalize the scope away so
        // unsubscribe bookkeeping matches.
        let scope = match audience {
            Audience::Admin => String::new(),
            _ => scope.to_string(),
        };

        self.registry.write().insert(audience, &scope, id, tx);

        Subscription { id, audience, scope, rx, registry: Arc::clone(&self.registry) }
    }

    /// Deliver an event to every live subscriber of `(audience, scope)`.
    ///
    /// Non-blocking by contract: a subscriber whose queue is full simply
    /// misses this event. Concurrent publishes proceed in parallel under
    /// the shared read lock.
    pub fn publish(&self, audience: Audience, scope: &str, event: &Event) {
        let registry = self.registry.read();
        match audience {
            Audience::Admin => {
                for tx in registry.admin.values() {
                    let _ = tx.try_send(event.clone());
                }
            }
            Audience::Technician => {
                if let Some(senders) = registry.technician.get(scope) {
                    for tx in senders.values() {
                        let _ = tx.try_send(event.clone());
                    }
                }
            }
            Audience::Customer => {
                if let Some(senders) = registry.customer.get(scope) {
                    for tx in senders.values() {
                        let _ = tx.try_send(event.clone());
                    }
                }
            }
        }
    }

    /// Deliver an event to every live subscription across all audiences
    /// (system-wide alerts).
    pub fn publish_broadcast(&self, event: &Event) {
        let registry = self.registry.read();
        for tx in registry.admin.values() {
            let _ = tx.try_send(event.clone());
        }
        for senders in registry.technician.values() {
            for tx in senders.values() {
                let _ = tx.try_send(event.clone());
            }
        }
        for senders in registry.customer.values() {
            for tx in senders.values() {
                let _ = tx.try_send(event.clone());
            }
        }
    }

    /// Live subscription counts for operational introspection
    pub fn stats(&self) -> BusStats {
        let registry = self.registry.read();
        BusStats {
            admin_clients: registry.admin.len(),
            technician_clients: registry.technician.values().map(FxHashMap::len).sum(),
            customer_clients: registry.customer.values().map(FxHashMap::len).sum(),
        }
    }
}

/// One subscriber's receive side.
///
/// Dropping the subscription removes it from the bus registry; the bus
/// then holds no sender for the queue, so `recv` on any clone-free
/// consumer unblocks with `None`.
pub struct Subscription {
    id: Uuid,
    audience: Audience,
    scope: String,
    rx: mpsc::Receiver<Event>,
    registry: Arc<RwLock<Registry>>,
}

impl Subscription {
    /// Next event, or `None` once the bus side has been torn down
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for draining in tests
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    pub fn audience(&self) -> Audience {
        self.audience
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.write().remove(self.audience, &self.scope, self.id);
    }
}
