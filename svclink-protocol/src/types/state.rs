use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    NotConnected,
    /// Bound (or binding) and waiting for the handshake to finish
    Connecting,
    /// Handshake complete, remote interface available
    Connected,
    /// Disconnect requested while a handshake was in flight
    Disconnecting,
    /// Reserved; no transition enters it and it behaves like `NotConnected`
    Error,
}

impl ConnectionState {
    /// States in which the connection holds a keeper subscription
    pub fn holds_binding(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Disconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotConnected => "not_connected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}
