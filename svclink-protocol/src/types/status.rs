use std::fmt;

use serde::{Deserialize, Serialize};

/// Status code reported by a broker when a handshake completes
///
/// Zero means success; anything else is a broker-defined failure. The named
/// constants cover the codes brokers commonly report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0);
    pub const SERVICE_MISSING: StatusCode = StatusCode(1);
    pub const SERVICE_VERSION_UPDATE_REQUIRED: StatusCode = StatusCode(2);
    pub const SERVICE_DISABLED: StatusCode = StatusCode(3);
    pub const SIGN_IN_REQUIRED: StatusCode = StatusCode(4);
    pub const NETWORK_ERROR: StatusCode = StatusCode(7);
    pub const INTERNAL_ERROR: StatusCode = StatusCode(8);
    pub const DEVELOPER_ERROR: StatusCode = StatusCode(10);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Symbolic name for known codes
    pub fn name(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("SUCCESS"),
            1 => Some("SERVICE_MISSING"),
            2 => Some("SERVICE_VERSION_UPDATE_REQUIRED"),
            3 => Some("SERVICE_DISABLED"),
            4 => Some("SIGN_IN_REQUIRED"),
            7 => Some("NETWORK_ERROR"),
            8 => Some("INTERNAL_ERROR"),
            10 => Some("DEVELOPER_ERROR"),
            _ => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_zero_is_success() {
        assert!(StatusCode::SUCCESS.is_success());
        assert!(StatusCode::from(0).is_success());
        assert!(!StatusCode::NETWORK_ERROR.is_success());
        assert!(!StatusCode(-1).is_success());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(StatusCode::SUCCESS.to_string(), "SUCCESS (0)");
        assert_eq!(StatusCode::DEVELOPER_ERROR.to_string(), "DEVELOPER_ERROR (10)");
        assert_eq!(StatusCode(42).to_string(), "status 42");
    }
}
