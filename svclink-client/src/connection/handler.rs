//! Connection callback trait and utilities

use std::fmt;
use std::sync::Arc;

use svclink_protocol::{ConnectionFailure, Params};

/// Callbacks a client supplies when creating a connection
///
/// Invoked on whichever thread delivered the triggering event, never while
/// the connection's internal lock is held, so calling back into the
/// connection is allowed.
pub trait ConnectionCallbacks: Send + Sync {
    /// The handshake completed and the remote interface is available
    fn on_connected(&self, _params: &Params) {}

    /// The connection attempt failed after binding
    fn on_connection_failed(&self, _reason: &ConnectionFailure) {}
}

impl<T: ConnectionCallbacks + ?Sized> ConnectionCallbacks for Arc<T> {
    fn on_connected(&self, params: &Params) {
        (**self).on_connected(params);
    }

    fn on_connection_failed(&self, reason: &ConnectionFailure) {
        (**self).on_connection_failed(reason);
    }
}

/// Callbacks that ignore every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl ConnectionCallbacks for NoopCallbacks {}

type ConnectedFn = Box<dyn Fn(&Params) + Send + Sync>;
type FailedFn = Box<dyn Fn(&ConnectionFailure) + Send + Sync>;

/// Closure-based callbacks
pub struct FnCallbacks {
    connected: ConnectedFn,
    failed: FailedFn,
}

impl FnCallbacks {
    pub fn new<C, F>(connected: C, failed: F) -> Self
    where
        C: Fn(&Params) + Send + Sync + 'static,
        F: Fn(&ConnectionFailure) + Send + Sync + 'static,
    {
        Self {
            connected: Box::new(connected),
            failed: Box::new(failed),
        }
    }

    /// Only react to successful connections
    pub fn on_connected<C>(connected: C) -> Self
    where
        C: Fn(&Params) + Send + Sync + 'static,
    {
        Self::new(connected, |_| {})
    }
}

impl ConnectionCallbacks for FnCallbacks {
    fn on_connected(&self, params: &Params) {
        (self.connected)(params);
    }

    fn on_connection_failed(&self, reason: &ConnectionFailure) {
        (self.failed)(reason);
    }
}

impl fmt::Debug for FnCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCallbacks").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use svclink_protocol::StatusCode;

    #[test]
    fn test_fn_callbacks_dispatch() {
        let connected = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let connected_clone = connected.clone();
        let failed_clone = failed.clone();

        let callbacks = FnCallbacks::new(
            move |_| {
                connected_clone.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                failed_clone.fetch_add(1, Ordering::SeqCst);
            },
        );

        callbacks.on_connected(&Params::new());
        callbacks.on_connected(&Params::new());
        callbacks.on_connection_failed(&ConnectionFailure::MissingHandle);

        assert_eq!(connected.load(Ordering::SeqCst), 2);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fn_callbacks_receive_arguments() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let callbacks = FnCallbacks::on_connected(move |params| {
            seen_clone.lock().push(params.get_str("account").map(String::from));
        });

        callbacks.on_connected(&Params::new().with("account", "user@example.com"));
        // Failure side is a no-op
        callbacks.on_connection_failed(&ConnectionFailure::Status(StatusCode::NETWORK_ERROR));

        assert_eq!(*seen.lock(), vec![Some("user@example.com".to_string())]);
    }

    #[test]
    fn test_shared_callbacks_forward() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let shared = Arc::new(FnCallbacks::on_connected(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let boxed: Box<dyn ConnectionCallbacks> = Box::new(shared.clone());
        boxed.on_connected(&Params::new());
        shared.on_connected(&Params::new());

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_noop_callbacks_do_nothing() {
        let callbacks = NoopCallbacks;
        callbacks.on_connected(&Params::new());
        callbacks.on_connection_failed(&ConnectionFailure::MissingHandle);
    }

    // Callbacks are shared with event-delivery threads
    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_callbacks_are_send_sync() {
        assert_send_sync::<FnCallbacks>();
        assert_send_sync::<NoopCallbacks>();
    }
}
