//! Error types for svclink
//!
//! Provides a unified error type used across all svclink crates.

use std::path::PathBuf;

/// Main error type for svclink operations
#[derive(Debug, thiserror::Error)]
pub enum SvclinkError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Binding Errors ===

    #[error("Failed to bind {key}: {reason}")]
    Bind { key: String, reason: String },

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Service platform unavailable")]
    Unavailable,

    // === Handshake Errors ===

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Invalid remote handle: {0}")]
    InvalidHandle(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SvclinkError {
    /// Create a bind error
    pub fn bind(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Bind {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a handshake error
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    /// Create an invalid handle error
    pub fn invalid_handle(msg: impl Into<String>) -> Self {
        Self::InvalidHandle(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable
    ///
    /// Nothing in svclink retries on its own; this tells the caller whether a
    /// later `connect()` has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::Unavailable)
    }
}

/// Result type alias using SvclinkError
pub type Result<T> = std::result::Result<T, SvclinkError>;
