//! Seams to the host platform
//!
//! The platform resolves a transport key to a running service and hands back
//! a [`ServiceHandle`]; the service's [`Broker`] then negotiates the handshake.
//! Both are provided by the host, svclink only consumes them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use svclink_protocol::{HandshakeRequest, TransportKey};
use svclink_utils::Result;

use crate::connection::HandshakeCallback;

/// Receives physical connection events for one binding
///
/// Events may arrive on any thread, at any time after `Platform::bind`
/// returns (or during it).
pub trait ServiceListener: Send + Sync {
    /// The physical connection is established
    fn on_ready(&self, key: &TransportKey, handle: ServiceHandle);

    /// The physical connection was lost (service crashed or went away)
    fn on_lost(&self, key: &TransportKey);
}

/// Platform binding primitives
pub trait Platform: Send + Sync {
    /// Pre-flight check run before any bind attempt
    fn is_available(&self) -> bool;

    /// Start binding `key`; readiness is reported later through `listener`
    ///
    /// An error means the platform refused the bind and no event will follow.
    fn bind(&self, key: &TransportKey, listener: Arc<dyn ServiceListener>) -> Result<()>;

    /// Release the binding made with `listener`
    fn unbind(&self, key: &TransportKey, listener: &Arc<dyn ServiceListener>);
}

/// Broker exposed by a bound service, used to negotiate the handshake
pub trait Broker: Send + Sync {
    /// Issue the handshake request
    ///
    /// Returning an error means the request itself failed. Otherwise the
    /// broker completes the handshake, now or later, through `callback`.
    fn request_service(&self, request: HandshakeRequest, callback: HandshakeCallback) -> Result<()>;
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// One established physical connection
///
/// Cloning is cheap; all clones refer to the same broker.
#[derive(Clone)]
pub struct ServiceHandle {
    id: u64,
    broker: Arc<dyn Broker>,
}

impl ServiceHandle {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            broker,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle").field("id", &self.id).finish()
    }
}

/// Identity comparison for listeners (ignores vtable pointers)
pub fn same_listener(a: &Arc<dyn ServiceListener>, b: &Arc<dyn ServiceListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullListener;

    impl ServiceListener for NullListener {
        fn on_ready(&self, _key: &TransportKey, _handle: ServiceHandle) {}
        fn on_lost(&self, _key: &TransportKey) {}
    }

    struct NullBroker;

    impl Broker for NullBroker {
        fn request_service(&self, _request: HandshakeRequest, _callback: HandshakeCallback) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_service_handle_ids_are_unique() {
        let broker: Arc<dyn Broker> = Arc::new(NullBroker);
        let a = ServiceHandle::new(broker.clone());
        let b = ServiceHandle::new(broker);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_same_listener_is_identity() {
        let a: Arc<dyn ServiceListener> = Arc::new(NullListener);
        let b: Arc<dyn ServiceListener> = Arc::new(NullListener);
        assert!(same_listener(&a, &a.clone()));
        assert!(!same_listener(&a, &b));
    }
}
