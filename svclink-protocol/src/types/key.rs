use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the physical service a client binds to
///
/// Usually an action string such as `org.example.location.START`. All clients
/// using the same key share one physical connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportKey(String);

impl TransportKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransportKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TransportKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl AsRef<str> for TransportKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_transport_key_display() {
        let key = TransportKey::new("org.example.location.START");
        assert_eq!(key.to_string(), "org.example.location.START");
        assert_eq!(key.as_str(), "org.example.location.START");
    }

    #[test]
    fn test_transport_key_equality_is_by_value() {
        let a: TransportKey = "org.example.games.START".into();
        let b = TransportKey::from(String::from("org.example.games.START"));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_transport_key_serializes_as_plain_string() {
        let key = TransportKey::new("org.example.START");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"org.example.START\"");
    }
}
