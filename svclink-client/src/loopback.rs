//! In-process service platform
//!
//! [`LoopbackPlatform`] hosts brokers registered under transport keys and
//! reports binds as ready on a tokio runtime, after an optional delay. It lets
//! an application run services in the same process as their clients, and
//! gives the async tests a platform that behaves like a real one: events
//! arrive later, on runtime threads, and can race with unbinds.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use svclink_protocol::{HandshakeRequest, Params, RemoteHandle, StatusCode, TransportKey};
use svclink_utils::{Result, SvclinkError};

use crate::config::LoopbackConfig;
use crate::connection::HandshakeCallback;
use crate::platform::{same_listener, Broker, Platform, ServiceHandle, ServiceListener};

struct LoopbackBinding {
    key: TransportKey,
    listener: Arc<dyn ServiceListener>,
    /// Cancels the pending ready delivery
    cancel: CancellationToken,
}

#[derive(Default)]
struct Registry {
    services: HashMap<TransportKey, Arc<dyn Broker>>,
    bindings: Vec<LoopbackBinding>,
    binds: usize,
    unbinds: usize,
}

pub struct LoopbackPlatform {
    runtime: Handle,
    delivery_delay: Duration,
    available: AtomicBool,
    registry: Mutex<Registry>,
}

impl LoopbackPlatform {
    /// Create a platform delivering events on `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            delivery_delay: Duration::ZERO,
            available: AtomicBool::new(true),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Create a platform on the runtime of the calling task
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| SvclinkError::internal(format!("no tokio runtime: {}", e)))?;
        Ok(Self::new(runtime))
    }

    pub fn from_config(runtime: Handle, config: &LoopbackConfig) -> Self {
        Self::new(runtime).with_delivery_delay(config.delivery_delay())
    }

    pub fn with_delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = delay;
        self
    }

    /// Host `broker` under `key`, replacing any previous service
    pub fn register(&self, key: impl Into<TransportKey>, broker: Arc<dyn Broker>) {
        let key = key.into();
        let replaced = self.registry.lock().services.insert(key.clone(), broker);
        if replaced.is_some() {
            info!(key = %key, "Replaced loopback service");
        } else {
            info!(key = %key, "Registered loopback service");
        }
    }

    /// Stop hosting `key`; bound listeners are told the service is lost
    ///
    /// Returns false if nothing was registered under `key`.
    pub fn withdraw(&self, key: &TransportKey) -> bool {
        let listeners = {
            let mut registry = self.registry.lock();
            if registry.services.remove(key).is_none() {
                return false;
            }
            registry
                .bindings
                .iter()
                .filter(|binding| &binding.key == key)
                .map(|binding| {
                    binding.cancel.cancel();
                    binding.listener.clone()
                })
                .collect::<Vec<_>>()
        };

        info!(key = %key, bound = listeners.len(), "Withdrew loopback service");
        let key = key.clone();
        self.runtime.spawn(async move {
            for listener in listeners {
                listener.on_lost(&key);
            }
        });
        true
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Physical binds accepted so far
    pub fn bind_count(&self) -> usize {
        self.registry.lock().binds
    }

    /// Physical unbinds so far
    pub fn unbind_count(&self) -> usize {
        self.registry.lock().unbinds
    }

    /// Bindings currently held
    pub fn active_bindings(&self) -> usize {
        self.registry.lock().bindings.len()
    }
}

impl Platform for LoopbackPlatform {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn bind(&self, key: &TransportKey, listener: Arc<dyn ServiceListener>) -> Result<()> {
        if !self.is_available() {
            return Err(SvclinkError::Unavailable);
        }

        let mut registry = self.registry.lock();
        let broker = registry
            .services
            .get(key)
            .cloned()
            .ok_or_else(|| SvclinkError::ServiceNotFound(key.to_string()))?;

        let cancel = CancellationToken::new();
        registry.bindings.push(LoopbackBinding {
            key: key.clone(),
            listener: listener.clone(),
            cancel: cancel.clone(),
        });
        registry.binds += 1;
        drop(registry);

        debug!(key = %key, delay = ?self.delivery_delay, "Loopback bind");
        let key = key.clone();
        let delay = self.delivery_delay;
        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    trace!(key = %key, "Ready delivery cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    listener.on_ready(&key, ServiceHandle::new(broker));
                }
            }
        });
        Ok(())
    }

    fn unbind(&self, key: &TransportKey, listener: &Arc<dyn ServiceListener>) {
        let mut registry = self.registry.lock();
        let position = registry
            .bindings
            .iter()
            .position(|binding| &binding.key == key && same_listener(&binding.listener, listener));

        match position {
            Some(index) => {
                let binding = registry.bindings.swap_remove(index);
                binding.cancel.cancel();
                registry.unbinds += 1;
                debug!(key = %key, "Loopback unbind");
            }
            None => trace!(key = %key, "Unbind for unknown loopback binding"),
        }
    }
}

impl fmt::Debug for LoopbackPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        let mut services: Vec<&TransportKey> = registry.services.keys().collect();
        services.sort();
        f.debug_struct("LoopbackPlatform")
            .field("services", &services)
            .field("bindings", &registry.bindings.len())
            .field("delivery_delay", &self.delivery_delay)
            .finish()
    }
}

/// Broker answering every handshake at once with a fixed outcome
pub struct LocalBroker {
    status: StatusCode,
    handle: Option<RemoteHandle>,
    params: Params,
}

impl LocalBroker {
    /// Serve `handle` to every client
    pub fn new(handle: RemoteHandle) -> Self {
        Self {
            status: StatusCode::SUCCESS,
            handle: Some(handle),
            params: Params::new(),
        }
    }

    /// Reject every handshake with `status`
    pub fn rejecting(status: StatusCode) -> Self {
        Self {
            status,
            handle: None,
            params: Params::new(),
        }
    }

    /// Params passed along with every completion
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

impl Broker for LocalBroker {
    fn request_service(&self, request: HandshakeRequest, callback: HandshakeCallback) -> Result<()> {
        debug!(
            action = %request.action,
            package = %request.package_name,
            version = request.client_version,
            status = %self.status,
            "Loopback handshake"
        );
        callback.on_complete(self.status, self.handle.clone(), self.params.clone());
        Ok(())
    }
}

impl fmt::Debug for LocalBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBroker")
            .field("status", &self.status)
            .field("handle", &self.handle)
            .finish()
    }
}
