//! Handshake completion sink handed to brokers

use std::fmt;
use std::sync::Weak;

use tracing::debug;

use svclink_protocol::{Params, RemoteHandle, StatusCode};

use crate::keeper::SubscriberToken;

/// Identifies one handshake attempt of one subscription
///
/// A completion only takes effect if its ticket still matches the
/// connection's active subscription and outstanding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandshakeTicket {
    token: SubscriberToken,
    attempt: u64,
}

impl HandshakeTicket {
    pub(crate) fn new(token: SubscriberToken, attempt: u64) -> Self {
        Self { token, attempt }
    }

    pub fn token(&self) -> SubscriberToken {
        self.token
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }
}

/// Receiver of handshake completions (the owning connection)
pub(crate) trait HandshakeTarget: Send + Sync {
    fn handshake_complete(
        &self,
        ticket: HandshakeTicket,
        status: StatusCode,
        handle: Option<RemoteHandle>,
        params: Params,
    );
}

/// Single-use completion callback for one handshake attempt
///
/// Completing consumes the callback, so a broker can report at most one
/// outcome per attempt. The callback only weakly references its connection;
/// completing after the connection was dropped does nothing.
pub struct HandshakeCallback {
    target: Weak<dyn HandshakeTarget>,
    ticket: HandshakeTicket,
}

impl HandshakeCallback {
    pub(crate) fn new(target: Weak<dyn HandshakeTarget>, ticket: HandshakeTicket) -> Self {
        Self { target, ticket }
    }

    pub fn ticket(&self) -> HandshakeTicket {
        self.ticket
    }

    /// Report the handshake outcome
    pub fn on_complete(self, status: StatusCode, handle: Option<RemoteHandle>, params: Params) {
        match self.target.upgrade() {
            Some(target) => target.handshake_complete(self.ticket, status, handle, params),
            None => debug!(
                token = %self.ticket.token,
                attempt = self.ticket.attempt,
                "Handshake completed after its connection was dropped"
            ),
        }
    }

    /// Shorthand for a successful completion
    pub fn succeed(self, handle: RemoteHandle, params: Params) {
        self.on_complete(StatusCode::SUCCESS, Some(handle), params);
    }
}

impl fmt::Debug for HandshakeCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeCallback")
            .field("ticket", &self.ticket)
            .field("live", &(self.target.strong_count() > 0))
            .finish()
    }
}
