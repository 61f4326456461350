//! Connection state machine

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use svclink_protocol::{
    ConnectionFailure, ConnectionState, HandshakeRequest, Params, RemoteHandle, StatusCode,
    TransportKey,
};
use svclink_utils::SvclinkError;

use super::handler::ConnectionCallbacks;
use super::handshake::{HandshakeCallback, HandshakeTarget, HandshakeTicket};
use crate::adapter::ServiceAdapter;
use crate::config::ClientConfig;
use crate::keeper::{Binding, ConnectionKeeper, SubscriberToken};
use crate::platform::{ServiceHandle, ServiceListener};

/// Mutable part of a connection, guarded by one lock
struct Shared<I: ?Sized> {
    state: ConnectionState,
    /// Present iff `state == Connected`
    remote: Option<Arc<I>>,
    /// Present iff `state.holds_binding()`
    binding: Option<Binding>,
    /// Outstanding handshake attempt, at most one
    handshake: Option<u64>,
    attempts: u64,
}

impl<I: ?Sized> Shared<I> {
    fn is_current(&self, token: SubscriberToken) -> bool {
        self.binding.as_ref().map_or(false, |b| b.token() == token)
    }

    fn is_outstanding(&self, ticket: HandshakeTicket) -> bool {
        self.is_current(ticket.token()) && self.handshake == Some(ticket.attempt())
    }
}

/// What to do once the lock is released after a handshake completion
enum Completion {
    Connected(Params),
    Failed(Option<Binding>, ConnectionFailure),
    Discarded(Option<Binding>),
}

struct Inner<I: ?Sized> {
    id: Uuid,
    key: TransportKey,
    keeper: Arc<ConnectionKeeper>,
    adapter: Box<dyn ServiceAdapter<I>>,
    callbacks: Box<dyn ConnectionCallbacks>,
    config: ClientConfig,
    shared: Mutex<Shared<I>>,
    state_tx: watch::Sender<ConnectionState>,
    this: Weak<Inner<I>>,
}

impl<I: ?Sized + Send + Sync + 'static> Inner<I> {
    fn set_state(&self, shared: &mut Shared<I>, next: ConnectionState) {
        if shared.state != next {
            debug!(connection = %self.id, key = %self.key, from = %shared.state, to = %next, "State change");
            shared.state = next;
            self.state_tx.send_replace(next);
        }
    }

    /// Reset to `NotConnected`, returning the binding to release
    fn teardown(&self, shared: &mut Shared<I>) -> Option<Binding> {
        shared.remote = None;
        shared.handshake = None;
        self.set_state(shared, ConnectionState::NotConnected);
        shared.binding.take()
    }

    fn release(&self, binding: Option<Binding>) {
        if let Some(binding) = binding {
            self.keeper.unbind(binding.key(), binding.token());
        }
    }

    fn connect(&self) {
        {
            let mut shared = self.shared.lock();
            let state = shared.state;
            match state {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    trace!(connection = %self.id, %state, "connect() ignored");
                    return;
                }
                ConnectionState::Disconnecting => {
                    // Keep the live binding; the in-flight handshake is adopted again
                    debug!(connection = %self.id, "connect() while disconnecting, resuming");
                    self.set_state(&mut shared, ConnectionState::Connecting);
                    return;
                }
                ConnectionState::NotConnected | ConnectionState::Error => {}
            }
        }

        if !self.keeper.platform().is_available() {
            debug!(connection = %self.id, key = %self.key, "Service platform unavailable, not connecting");
            return;
        }

        let token = SubscriberToken::next();
        {
            let mut shared = self.shared.lock();
            if shared.state.holds_binding() {
                trace!(connection = %self.id, "Concurrent connect() won the race");
                return;
            }
            shared.binding = Some(Binding::new(self.key.clone(), token));
            self.set_state(&mut shared, ConnectionState::Connecting);
        }

        info!(connection = %self.id, key = %self.key, %token, "Connecting");
        let listener: Arc<dyn ServiceListener> = Arc::new(ConnectionListener {
            owner: self.this.clone(),
            token,
        });
        self.keeper.bind(&self.key, token, listener);
    }

    fn disconnect(&self) {
        let binding = {
            let mut shared = self.shared.lock();
            let state = shared.state;
            match state {
                ConnectionState::Disconnecting => {
                    trace!(connection = %self.id, "disconnect() ignored, already disconnecting");
                    return;
                }
                ConnectionState::Connecting => {
                    // The binding is released once the handshake resolves
                    debug!(connection = %self.id, "disconnect() during handshake, deferring teardown");
                    self.set_state(&mut shared, ConnectionState::Disconnecting);
                    return;
                }
                ConnectionState::Connected
                | ConnectionState::NotConnected
                | ConnectionState::Error => self.teardown(&mut shared),
            }
        };

        if binding.is_some() {
            info!(connection = %self.id, key = %self.key, "Disconnected");
        }
        self.release(binding);
    }

    fn service_ready(&self, token: SubscriberToken, handle: ServiceHandle) {
        let ticket = {
            let mut shared = self.shared.lock();
            if !shared.is_current(token) {
                trace!(connection = %self.id, %token, "Ignoring ready event for stale subscription");
                return;
            }
            let state = shared.state;
            match state {
                ConnectionState::Connecting | ConnectionState::Disconnecting
                    if shared.handshake.is_none() =>
                {
                    shared.attempts += 1;
                    shared.handshake = Some(shared.attempts);
                    HandshakeTicket::new(token, shared.attempts)
                }
                _ => {
                    debug!(connection = %self.id, %state, handshake = ?shared.handshake, "Ignoring ready event");
                    return;
                }
            }
        };

        let request = HandshakeRequest::new(
            self.adapter.action_name(),
            self.config.client_version,
            self.config.package_name.as_str(),
        )
        .with_params(self.adapter.extra_params());

        let target: Weak<dyn HandshakeTarget> = self.this.clone();
        let callback = HandshakeCallback::new(target, ticket);

        debug!(
            connection = %self.id,
            handle = handle.id(),
            attempt = ticket.attempt(),
            "Starting handshake"
        );
        if let Err(e) = self.adapter.on_broker_ready(handle.broker().as_ref(), request, callback) {
            warn!(connection = %self.id, key = %self.key, error = %e, "Handshake request failed");
            self.handshake_failed(ticket, e);
        }
    }

    fn handshake_failed(&self, ticket: HandshakeTicket, error: SvclinkError) {
        let (binding, report) = {
            let mut shared = self.shared.lock();
            if !shared.is_outstanding(ticket) {
                trace!(connection = %self.id, attempt = ticket.attempt(), "Handshake already resolved");
                return;
            }
            let report = shared.state == ConnectionState::Connecting;
            (self.teardown(&mut shared), report)
        };

        self.release(binding);
        if report {
            self.callbacks
                .on_connection_failed(&ConnectionFailure::Handshake(error.to_string()));
        }
    }

    fn service_lost(&self, token: SubscriberToken) {
        let binding = {
            let mut shared = self.shared.lock();
            if !shared.is_current(token) || !shared.state.holds_binding() {
                trace!(connection = %self.id, %token, "Ignoring lost event");
                return;
            }
            info!(connection = %self.id, key = %self.key, state = %shared.state, "Service connection lost");
            self.teardown(&mut shared)
        };

        // No retry; the client decides whether to connect again
        self.release(binding);
    }

    fn adopt(&self, status: StatusCode, handle: Option<RemoteHandle>) -> Result<Arc<I>, ConnectionFailure> {
        if !status.is_success() {
            return Err(ConnectionFailure::Status(status));
        }
        let handle = handle.ok_or(ConnectionFailure::MissingHandle)?;
        self.adapter.wrap(handle).map_err(|e| match e {
            SvclinkError::InvalidHandle(message) => ConnectionFailure::InvalidHandle(message),
            other => ConnectionFailure::InvalidHandle(other.to_string()),
        })
    }
}

impl<I: ?Sized + Send + Sync + 'static> HandshakeTarget for Inner<I> {
    fn handshake_complete(
        &self,
        ticket: HandshakeTicket,
        status: StatusCode,
        handle: Option<RemoteHandle>,
        params: Params,
    ) {
        let completion = {
            let mut shared = self.shared.lock();
            if !shared.is_outstanding(ticket) {
                debug!(
                    connection = %self.id,
                    attempt = ticket.attempt(),
                    "Discarding stale handshake completion"
                );
                return;
            }
            shared.handshake = None;

            let state = shared.state;
            match state {
                ConnectionState::Disconnecting => Completion::Discarded(self.teardown(&mut shared)),
                ConnectionState::Connecting => match self.adopt(status, handle) {
                    Ok(remote) => {
                        shared.remote = Some(remote);
                        self.set_state(&mut shared, ConnectionState::Connected);
                        Completion::Connected(params)
                    }
                    Err(failure) => Completion::Failed(self.teardown(&mut shared), failure),
                },
                _ => {
                    // An outstanding handshake implies a bound state
                    warn!(connection = %self.id, %state, "Handshake completion in unexpected state");
                    return;
                }
            }
        };

        match completion {
            Completion::Connected(params) => {
                info!(connection = %self.id, key = %self.key, "Connected");
                self.callbacks.on_connected(&params);
            }
            Completion::Failed(binding, failure) => {
                warn!(connection = %self.id, key = %self.key, reason = %failure, "Connection failed");
                self.release(binding);
                self.callbacks.on_connection_failed(&failure);
            }
            Completion::Discarded(binding) => {
                debug!(connection = %self.id, %status, "Handshake finished after disconnect, tearing down");
                self.release(binding);
            }
        }
    }
}

/// Keeper subscription of one connection attempt
struct ConnectionListener<I: ?Sized> {
    owner: Weak<Inner<I>>,
    token: SubscriberToken,
}

impl<I: ?Sized + Send + Sync + 'static> ServiceListener for ConnectionListener<I> {
    fn on_ready(&self, _key: &TransportKey, handle: ServiceHandle) {
        if let Some(owner) = self.owner.upgrade() {
            owner.service_ready(self.token, handle);
        }
    }

    fn on_lost(&self, _key: &TransportKey) {
        if let Some(owner) = self.owner.upgrade() {
            owner.service_lost(self.token);
        }
    }
}

/// One logical connection to a service
///
/// `connect()` and `disconnect()` return immediately; results arrive through
/// the [`ConnectionCallbacks`] given at construction. Dropping the connection
/// releases its keeper subscription.
pub struct ClientConnection<I: ?Sized + Send + Sync + 'static> {
    inner: Arc<Inner<I>>,
}

impl<I: ?Sized + Send + Sync + 'static> ClientConnection<I> {
    /// Create a connection using the default client config
    pub fn new(
        keeper: Arc<ConnectionKeeper>,
        adapter: impl ServiceAdapter<I> + 'static,
        callbacks: impl ConnectionCallbacks + 'static,
    ) -> Self {
        Self::with_config(keeper, adapter, callbacks, ClientConfig::default())
    }

    pub fn with_config(
        keeper: Arc<ConnectionKeeper>,
        adapter: impl ServiceAdapter<I> + 'static,
        callbacks: impl ConnectionCallbacks + 'static,
        config: ClientConfig,
    ) -> Self {
        let key = TransportKey::new(adapter.action_name());
        let (state_tx, _) = watch::channel(ConnectionState::NotConnected);

        let inner = Arc::new_cyclic(|this| Inner {
            id: Uuid::new_v4(),
            key,
            keeper,
            adapter: Box::new(adapter),
            callbacks: Box::new(callbacks),
            config,
            shared: Mutex::new(Shared {
                state: ConnectionState::NotConnected,
                remote: None,
                binding: None,
                handshake: None,
                attempts: 0,
            }),
            state_tx,
            this: this.clone(),
        });

        debug!(connection = %inner.id, key = %inner.key, "Created connection");
        Self { inner }
    }

    /// Start connecting; a no-op while connecting or connected
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Disconnect; safe to call in any state
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// The typed remote interface, present only while connected
    ///
    /// Do not keep the returned handle past the next disconnect.
    pub fn remote_interface(&self) -> Option<Arc<I>> {
        self.inner.shared.lock().remote.clone()
    }

    /// Watch every state change
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn transport_key(&self) -> &TransportKey {
        &self.inner.key
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }
}

impl<I: ?Sized + Send + Sync + 'static> Drop for ClientConnection<I> {
    fn drop(&mut self) {
        let binding = {
            let mut shared = self.inner.shared.lock();
            shared.remote = None;
            shared.handshake = None;
            shared.binding.take()
        };
        if binding.is_some() {
            debug!(connection = %self.inner.id, "Connection dropped while bound, releasing");
        }
        self.inner.release(binding);
    }
}

impl<I: ?Sized + Send + Sync + 'static> fmt::Debug for ClientConnection<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("state", &self.state())
            .finish()
    }
}
