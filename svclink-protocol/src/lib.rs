//! svclink-protocol: Shared definitions for service connections
//!
//! This crate defines the data exchanged between a client connection, the
//! platform binder and a service broker: transport keys, handshake requests,
//! completion status codes, opaque remote handles and connection states.

pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use messages::{ConnectionFailure, HandshakeRequest};
pub use types::{ConnectionState, Params, RemoteHandle, StatusCode, TransportKey};

/// Version reported in handshake requests when the client config does not set one
pub const DEFAULT_CLIENT_VERSION: i32 = 1;
