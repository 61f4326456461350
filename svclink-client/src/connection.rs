//! Client connection lifecycle
//!
//! A [`ClientConnection`] owns one logical connection to a service: it
//! subscribes to the shared keeper, runs the broker handshake when the
//! physical connection is ready and exposes the typed remote interface once
//! the handshake completes.

mod client;
mod handler;
mod handshake;

pub use client::ClientConnection;
pub use handler::{ConnectionCallbacks, FnCallbacks, NoopCallbacks};
pub use handshake::{HandshakeCallback, HandshakeTicket};
