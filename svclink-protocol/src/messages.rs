//! Handshake request and connection failure definitions

use serde::{Deserialize, Serialize};

use crate::types::{Params, StatusCode};

/// Request handed to a broker when a client starts its handshake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Action name of the service being requested
    pub action: String,
    /// Version of the client library making the request
    pub client_version: i32,
    /// Package (application) identity of the caller
    pub package_name: String,
    /// Service-specific extras
    #[serde(default)]
    pub params: Params,
}

impl HandshakeRequest {
    pub fn new(action: impl Into<String>, client_version: i32, package_name: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            client_version,
            package_name: package_name.into(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// Reason passed to a client's connection-failed callback
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionFailure {
    /// The broker call issuing the handshake failed
    #[error("handshake request failed: {0}")]
    Handshake(String),

    /// The broker completed the handshake with a non-success status
    #[error("broker reported {0}")]
    Status(StatusCode),

    /// The broker reported success but returned no remote handle
    #[error("broker returned no remote handle")]
    MissingHandle,

    /// The remote handle could not be converted to the service interface
    #[error("invalid remote handle: {0}")]
    InvalidHandle(String),
}
