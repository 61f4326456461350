//! Scripted platform and broker doubles shared by the unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use svclink_protocol::{ConnectionFailure, HandshakeRequest, Params, TransportKey};
use svclink_utils::{Result, SvclinkError};

use crate::connection::{ConnectionCallbacks, HandshakeCallback};
use crate::platform::{same_listener, Broker, Platform, ServiceHandle, ServiceListener};

#[derive(Default)]
struct PlatformLog {
    binds: HashMap<TransportKey, usize>,
    unbinds: HashMap<TransportKey, usize>,
    active: Vec<(TransportKey, Arc<dyn ServiceListener>)>,
}

/// Platform whose events are delivered by the test, synchronously
pub struct ScriptedPlatform {
    available: AtomicBool,
    refuse: AtomicBool,
    log: Mutex<PlatformLog>,
    ready_on_bind: Mutex<Option<Arc<ScriptedBroker>>>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            refuse: AtomicBool::new(false),
            log: Mutex::new(PlatformLog::default()),
            ready_on_bind: Mutex::new(None),
        }
    }

    /// Report ready from inside `bind`, on the binding thread
    pub fn ready_on_bind(&self, broker: Option<Arc<ScriptedBroker>>) {
        *self.ready_on_bind.lock() = broker;
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make subsequent binds fail (they are still counted)
    pub fn refuse_binds(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn bind_count(&self, key: &TransportKey) -> usize {
        self.log.lock().binds.get(key).copied().unwrap_or(0)
    }

    pub fn unbind_count(&self, key: &TransportKey) -> usize {
        self.log.lock().unbinds.get(key).copied().unwrap_or(0)
    }

    pub fn active_listeners(&self, key: &TransportKey) -> usize {
        self.listeners(key).len()
    }

    /// Listeners currently bound to `key`
    pub fn listeners(&self, key: &TransportKey) -> Vec<Arc<dyn ServiceListener>> {
        self.log
            .lock()
            .active
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    /// Report the service behind `key` as ready to every bound listener
    pub fn deliver_ready(&self, key: &TransportKey, broker: Arc<ScriptedBroker>) {
        let broker: Arc<dyn Broker> = broker;
        let handle = ServiceHandle::new(broker);
        for listener in self.listeners(key) {
            listener.on_ready(key, handle.clone());
        }
    }

    /// Report the service behind `key` as gone to every bound listener
    pub fn deliver_lost(&self, key: &TransportKey) {
        for listener in self.listeners(key) {
            listener.on_lost(key);
        }
    }
}

impl Platform for ScriptedPlatform {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn bind(&self, key: &TransportKey, listener: Arc<dyn ServiceListener>) -> Result<()> {
        let mut log = self.log.lock();
        *log.binds.entry(key.clone()).or_default() += 1;
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SvclinkError::bind(key.as_str(), "refused by test"));
        }
        log.active.push((key.clone(), listener.clone()));
        drop(log);

        let broker = self.ready_on_bind.lock().clone();
        if let Some(broker) = broker {
            let broker: Arc<dyn Broker> = broker;
            listener.on_ready(key, ServiceHandle::new(broker));
        }
        Ok(())
    }

    fn unbind(&self, key: &TransportKey, listener: &Arc<dyn ServiceListener>) {
        let mut log = self.log.lock();
        *log.unbinds.entry(key.clone()).or_default() += 1;
        log.active
            .retain(|(k, bound)| !(k == key && same_listener(bound, listener)));
    }
}

/// Broker that parks handshake requests until the test completes them
#[derive(Default)]
pub struct ScriptedBroker {
    fail_requests: AtomicBool,
    requests: Mutex<Vec<HandshakeRequest>>,
    pending: Mutex<Vec<HandshakeCallback>>,
}

impl ScriptedBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `request_service` fail synchronously
    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<HandshakeRequest> {
        self.requests.lock().last().cloned()
    }

    /// Take every callback not completed yet, oldest first
    pub fn take_pending(&self) -> Vec<HandshakeCallback> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Take the single outstanding callback
    pub fn take_one(&self) -> HandshakeCallback {
        let mut pending = self.take_pending();
        assert_eq!(pending.len(), 1, "expected exactly one pending handshake");
        pending.remove(0)
    }
}

impl Broker for ScriptedBroker {
    fn request_service(&self, request: HandshakeRequest, callback: HandshakeCallback) -> Result<()> {
        self.requests.lock().push(request);
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(SvclinkError::handshake("broker rejected request"));
        }
        self.pending.lock().push(callback);
        Ok(())
    }
}

/// Listener counting the events it receives
#[derive(Default)]
pub struct RecordingListener {
    ready: AtomicUsize,
    lost: AtomicUsize,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ready_count(&self) -> usize {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn lost_count(&self) -> usize {
        self.lost.load(Ordering::SeqCst)
    }
}

impl ServiceListener for RecordingListener {
    fn on_ready(&self, _key: &TransportKey, _handle: ServiceHandle) {
        self.ready.fetch_add(1, Ordering::SeqCst);
    }

    fn on_lost(&self, _key: &TransportKey) {
        self.lost.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connection callbacks recording every invocation
#[derive(Default)]
pub struct RecordingCallbacks {
    connected: Mutex<Vec<Params>>,
    failures: Mutex<Vec<ConnectionFailure>>,
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connected_count(&self) -> usize {
        self.connected.lock().len()
    }

    pub fn last_params(&self) -> Option<Params> {
        self.connected.lock().last().cloned()
    }

    pub fn failures(&self) -> Vec<ConnectionFailure> {
        self.failures.lock().clone()
    }
}

impl ConnectionCallbacks for RecordingCallbacks {
    fn on_connected(&self, params: &Params) {
        self.connected.lock().push(params.clone());
    }

    fn on_connection_failed(&self, reason: &ConnectionFailure) {
        self.failures.lock().push(reason.clone());
    }
}

/// Concrete service object handed out by test brokers
#[derive(Debug, PartialEq)]
pub struct LocationService {
    pub provider: String,
}

impl LocationService {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
        }
    }
}

pub const LOCATION_ACTION: &str = "org.example.location.START";
