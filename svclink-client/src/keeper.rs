//! Shared physical connection registry
//!
//! Many logical clients may want the same service. The keeper makes sure a
//! transport key is bound at most once at a time: the first subscriber
//! triggers the platform bind, later ones join it, and the platform unbind
//! happens when the last subscriber leaves.
//!
//! Each "busy period" of a key gets its own [`PhysicalConnection`], which is
//! also the listener handed to the platform. Events reaching a physical
//! connection after it was torn down therefore reach nobody.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use svclink_protocol::TransportKey;

use crate::platform::{Platform, ServiceHandle, ServiceListener};

/// Process-unique identifier of one keeper subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl SubscriberToken {
    /// Allocate a fresh token
    pub fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscriber({})", self.0)
    }
}

/// A registered subscription, needed to release it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    key: TransportKey,
    token: SubscriberToken,
}

impl Binding {
    pub fn new(key: TransportKey, token: SubscriberToken) -> Self {
        Self { key, token }
    }

    pub fn key(&self) -> &TransportKey {
        &self.key
    }

    pub fn token(&self) -> SubscriberToken {
        self.token
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// Created, platform bind not issued yet
    Pending,
    /// Platform bind in progress
    Binding,
    /// Platform accepted the bind
    Bound,
    /// Platform refused the bind
    Failed,
    /// Torn down; never bind again
    Released,
}

struct Subscribers {
    listeners: HashMap<SubscriberToken, Arc<dyn ServiceListener>>,
    handle: Option<ServiceHandle>,
}

/// One physical connection to a transport key
///
/// Lock order: keeper map, then `subscribers`. `lifecycle` is never held
/// together with another lock or across a platform call, since the platform
/// may deliver events (and so reach `release`) from inside `bind`.
struct PhysicalConnection {
    key: TransportKey,
    subscribers: Mutex<Subscribers>,
    lifecycle: Mutex<Lifecycle>,
}

impl PhysicalConnection {
    fn new(key: TransportKey) -> Self {
        Self {
            key,
            subscribers: Mutex::new(Subscribers {
                listeners: HashMap::new(),
                handle: None,
            }),
            lifecycle: Mutex::new(Lifecycle::Pending),
        }
    }

    fn establish(self: &Arc<Self>, platform: &dyn Platform) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle != Lifecycle::Pending {
                // Last subscriber left before we got here
                debug!(key = %self.key, state = ?*lifecycle, "Skipping platform bind");
                return;
            }
            *lifecycle = Lifecycle::Binding;
        }

        let listener: Arc<dyn ServiceListener> = self.clone();
        let result = platform.bind(&self.key, listener.clone());

        let mut lifecycle = self.lifecycle.lock();
        match (result, *lifecycle) {
            (Ok(()), Lifecycle::Binding) => {
                info!(key = %self.key, "Bound physical connection");
                *lifecycle = Lifecycle::Bound;
            }
            (Ok(()), _) => {
                // Released while the platform was still binding; undo it here
                drop(lifecycle);
                platform.unbind(&self.key, &listener);
                info!(key = %self.key, "Unbound physical connection released during bind");
            }
            (Err(e), Lifecycle::Binding) => {
                // Not retried; subscribers stay pending until they unbind
                warn!(key = %self.key, error = %e, retryable = e.is_retryable(), "Platform refused bind");
                *lifecycle = Lifecycle::Failed;
            }
            (Err(e), state) => {
                debug!(key = %self.key, error = %e, ?state, "Platform refused bind after release");
            }
        }
    }

    fn release(self: &Arc<Self>, platform: &dyn Platform) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Released);
        if previous == Lifecycle::Bound {
            let listener: Arc<dyn ServiceListener> = self.clone();
            platform.unbind(&self.key, &listener);
            info!(key = %self.key, "Unbound physical connection");
        } else {
            debug!(key = %self.key, state = ?previous, "Released physical connection without platform unbind");
        }
    }

    fn snapshot(subscribers: &Subscribers) -> Vec<Arc<dyn ServiceListener>> {
        subscribers.listeners.values().cloned().collect()
    }
}

impl ServiceListener for PhysicalConnection {
    fn on_ready(&self, key: &TransportKey, handle: ServiceHandle) {
        let listeners = {
            let mut subscribers = self.subscribers.lock();
            subscribers.handle = Some(handle.clone());
            Self::snapshot(&subscribers)
        };

        debug!(key = %key, handle = handle.id(), subscribers = listeners.len(), "Physical connection ready");
        for listener in listeners {
            listener.on_ready(key, handle.clone());
        }
    }

    fn on_lost(&self, key: &TransportKey) {
        let listeners = {
            let mut subscribers = self.subscribers.lock();
            subscribers.handle = None;
            Self::snapshot(&subscribers)
        };

        info!(key = %key, subscribers = listeners.len(), "Physical connection lost");
        for listener in listeners {
            listener.on_lost(key);
        }
    }
}

/// Registry deduplicating physical connections per transport key
///
/// Thread-safe; all key-set mutations are serialized by one mutex. Platform
/// and listener calls are made after that mutex is released.
pub struct ConnectionKeeper {
    platform: Arc<dyn Platform>,
    connections: Mutex<HashMap<TransportKey, Arc<PhysicalConnection>>>,
}

impl ConnectionKeeper {
    /// Create an independent keeper
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Get the process-wide keeper, creating it on first use
    ///
    /// Only the first caller's platform is used; later arguments are ignored.
    pub fn shared(platform: Arc<dyn Platform>) -> Arc<Self> {
        static INSTANCE: OnceLock<Arc<ConnectionKeeper>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| {
                debug!("Creating process-wide connection keeper");
                Arc::new(Self::new(platform))
            })
            .clone()
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    /// Register interest in a live connection for `key`
    ///
    /// The first subscriber of a busy period triggers the platform bind. A
    /// subscriber joining an already ready connection receives `on_ready`
    /// before this returns. Binding the same token twice is a no-op.
    pub fn bind(&self, key: &TransportKey, token: SubscriberToken, listener: Arc<dyn ServiceListener>) {
        let (physical, created, ready) = {
            let mut connections = self.connections.lock();
            let mut created = false;
            let physical = connections
                .entry(key.clone())
                .or_insert_with(|| {
                    created = true;
                    Arc::new(PhysicalConnection::new(key.clone()))
                })
                .clone();

            let mut subscribers = physical.subscribers.lock();
            if subscribers.listeners.contains_key(&token) {
                debug!(key = %key, %token, "Subscriber already bound");
                return;
            }
            subscribers.listeners.insert(token, listener.clone());
            let ready = subscribers.handle.clone();
            debug!(key = %key, %token, subscribers = subscribers.listeners.len(), "Subscriber joined");
            drop(subscribers);

            (physical, created, ready)
        };

        if created {
            physical.establish(self.platform.as_ref());
        }

        if let Some(handle) = ready {
            trace!(key = %key, %token, "Delivering existing connection to new subscriber");
            listener.on_ready(key, handle);
        }
    }

    /// Remove a subscriber, tearing the physical connection down if it was the last
    ///
    /// Unknown keys and tokens are ignored.
    pub fn unbind(&self, key: &TransportKey, token: SubscriberToken) {
        let released = {
            let mut connections = self.connections.lock();
            let Some(physical) = connections.get(key).cloned() else {
                trace!(key = %key, %token, "Unbind for unknown key");
                return;
            };

            let mut subscribers = physical.subscribers.lock();
            if subscribers.listeners.remove(&token).is_none() {
                trace!(key = %key, %token, "Unbind for unknown subscriber");
                return;
            }
            if !subscribers.listeners.is_empty() {
                debug!(key = %key, %token, remaining = subscribers.listeners.len(), "Subscriber left");
                return;
            }
            subscribers.handle = None;
            drop(subscribers);

            connections.remove(key);
            physical
        };

        debug!(key = %key, %token, "Last subscriber left");
        released.release(self.platform.as_ref());
    }

    /// Number of subscribers currently registered for `key`
    pub fn subscriber_count(&self, key: &TransportKey) -> usize {
        self.connections
            .lock()
            .get(key)
            .map(|physical| physical.subscribers.lock().listeners.len())
            .unwrap_or(0)
    }

    /// Whether a physical connection entry exists for `key`
    pub fn is_bound(&self, key: &TransportKey) -> bool {
        self.connections.lock().contains_key(key)
    }

    /// Number of keys with a physical connection entry
    pub fn key_count(&self) -> usize {
        self.connections.lock().len()
    }
}

impl fmt::Debug for ConnectionKeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connections = self.connections.lock();
        let mut keys: Vec<&TransportKey> = connections.keys().collect();
        keys.sort();
        f.debug_struct("ConnectionKeeper").field("keys", &keys).finish()
    }
}
