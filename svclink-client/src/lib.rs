//! svclink-client: Client-side service connection lifecycle
//!
//! This crate provides:
//! - [`ClientConnection`], the per-client connection state machine
//! - [`ConnectionKeeper`], which shares one physical binding per transport key
//! - The [`Platform`] and [`Broker`] seams a host implements, and an
//!   in-process [`LoopbackPlatform`]
//! - [`ClientConfig`], loaded from `$XDG_CONFIG_HOME/svclink/config.toml`
//!
//! ```no_run
//! use std::sync::Arc;
//! use svclink_client::{
//!     ClientConnection, ConnectionKeeper, DowncastAdapter, FnCallbacks, LocalBroker,
//!     LoopbackPlatform,
//! };
//! use svclink_protocol::RemoteHandle;
//!
//! struct Clock;
//!
//! # async fn run() -> svclink_utils::Result<()> {
//! let platform = Arc::new(LoopbackPlatform::current()?);
//! platform.register("org.example.clock.START", Arc::new(LocalBroker::new(RemoteHandle::new(Clock))));
//!
//! let keeper = ConnectionKeeper::shared(platform);
//! let conn = ClientConnection::new(
//!     keeper,
//!     DowncastAdapter::<Clock>::new("org.example.clock.START"),
//!     FnCallbacks::on_connected(|_| tracing::info!("clock connected")),
//! );
//! conn.connect();
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod connection;
pub mod keeper;
pub mod loopback;
pub mod platform;

#[cfg(test)]
mod test_support;

pub use adapter::{DowncastAdapter, ServiceAdapter};
pub use config::{ClientConfig, LoopbackConfig};
pub use connection::{
    ClientConnection, ConnectionCallbacks, FnCallbacks, HandshakeCallback, HandshakeTicket,
    NoopCallbacks,
};
pub use keeper::{Binding, ConnectionKeeper, SubscriberToken};
pub use loopback::{LocalBroker, LoopbackPlatform};
pub use platform::{Broker, Platform, ServiceHandle, ServiceListener};
