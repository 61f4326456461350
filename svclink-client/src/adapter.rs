//! Per-service capability used by the connection state machine
//!
//! A [`ServiceAdapter`] tells a connection which transport key to bind, how
//! to talk to the broker once the service is up, and how to turn the handle
//! the broker returns into the typed interface the application uses.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use svclink_protocol::{HandshakeRequest, Params, RemoteHandle};
use svclink_utils::{Result, SvclinkError};

use crate::connection::HandshakeCallback;
use crate::platform::Broker;

pub trait ServiceAdapter<I: ?Sized>: Send + Sync {
    /// Action name of the service; also the transport key
    fn action_name(&self) -> &str;

    /// Service-specific extras merged into the handshake request
    fn extra_params(&self) -> Params {
        Params::new()
    }

    /// Issue the broker-specific handshake
    ///
    /// An error is treated as a failed handshake and tears the connection
    /// down. The default forwards the request unchanged.
    fn on_broker_ready(
        &self,
        broker: &dyn Broker,
        request: HandshakeRequest,
        callback: HandshakeCallback,
    ) -> Result<()> {
        broker.request_service(request, callback)
    }

    /// Convert the handle returned by the broker into the service interface
    ///
    /// Runs while the connection's state is locked; it must not call back
    /// into the connection.
    fn wrap(&self, handle: RemoteHandle) -> Result<Arc<I>>;
}

/// Adapter for services whose remote handle already is the interface object
pub struct DowncastAdapter<T> {
    action: String,
    params: Params,
    _interface: PhantomData<fn() -> T>,
}

impl<T> DowncastAdapter<T> {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Params::new(),
            _interface: PhantomData,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

impl<T: Any + Send + Sync> ServiceAdapter<T> for DowncastAdapter<T> {
    fn action_name(&self) -> &str {
        &self.action
    }

    fn extra_params(&self) -> Params {
        self.params.clone()
    }

    fn wrap(&self, handle: RemoteHandle) -> Result<Arc<T>> {
        handle.downcast::<T>().ok_or_else(|| {
            SvclinkError::invalid_handle(format!(
                "expected {}, got {}",
                std::any::type_name::<T>(),
                handle.type_name()
            ))
        })
    }
}

impl<T> fmt::Debug for DowncastAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DowncastAdapter")
            .field("action", &self.action)
            .field("interface", &std::any::type_name::<T>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct LocationService {
        accuracy_m: u32,
    }

    #[test]
    fn test_downcast_adapter_wraps_matching_handle() {
        let adapter = DowncastAdapter::<LocationService>::new("org.example.location.START");
        let wrapped = adapter
            .wrap(RemoteHandle::new(LocationService { accuracy_m: 5 }))
            .unwrap();
        assert_eq!(wrapped.accuracy_m, 5);
        assert_eq!(adapter.action_name(), "org.example.location.START");
    }

    #[test]
    fn test_downcast_adapter_rejects_foreign_handle() {
        let adapter = DowncastAdapter::<LocationService>::new("org.example.location.START");
        let err = adapter.wrap(RemoteHandle::new("not a service")).unwrap_err();

        assert!(matches!(err, SvclinkError::InvalidHandle(_)));
        assert!(err.to_string().contains("LocationService"));
    }

    #[test]
    fn test_downcast_adapter_extra_params() {
        let adapter = DowncastAdapter::<LocationService>::new("org.example.location.START")
            .with_params(Params::new().with("priority", "balanced"));
        assert_eq!(adapter.extra_params().get_str("priority"), Some("balanced"));
    }

    // Adapters for trait-object interfaces wrap the raw binder in a proxy
    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct GreeterBinder(String);

    struct GreeterProxy(Arc<GreeterBinder>);

    impl Greeter for GreeterProxy {
        fn greet(&self) -> String {
            format!("hello from {}", self.0 .0)
        }
    }

    struct GreeterAdapter;

    impl ServiceAdapter<dyn Greeter> for GreeterAdapter {
        fn action_name(&self) -> &str {
            "org.example.greeter.START"
        }

        fn wrap(&self, handle: RemoteHandle) -> Result<Arc<dyn Greeter>> {
            let binder = handle
                .downcast::<GreeterBinder>()
                .ok_or_else(|| SvclinkError::invalid_handle("expected GreeterBinder"))?;
            Ok(Arc::new(GreeterProxy(binder)))
        }
    }

    #[test]
    fn test_trait_object_interface() {
        let adapter = GreeterAdapter;
        let greeter = adapter
            .wrap(RemoteHandle::new(GreeterBinder("broker".into())))
            .unwrap();
        assert_eq!(greeter.greet(), "hello from broker");
        assert!(adapter.extra_params().is_empty());
    }
}
