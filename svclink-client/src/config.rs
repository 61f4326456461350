//! Client-side configuration loading
//!
//! Loads the handshake identity and loopback settings from
//! `$XDG_CONFIG_HOME/svclink/config.toml`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use svclink_protocol::DEFAULT_CLIENT_VERSION;
use svclink_utils::{paths, Result, SvclinkError};

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Package identity sent in handshake requests
    pub package_name: String,
    /// Client library version sent in handshake requests
    pub client_version: i32,
    /// In-process loopback platform settings
    pub loopback: LoopbackConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            package_name: "svclink".into(),
            client_version: DEFAULT_CLIENT_VERSION,
            loopback: LoopbackConfig::default(),
        }
    }
}

/// Loopback platform configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Delay before a bind is reported ready (default: 0ms)
    pub delivery_delay_ms: u64,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self { delivery_delay_ms: 0 }
    }
}

impl LoopbackConfig {
    pub fn delivery_delay(&self) -> Duration {
        Duration::from_millis(self.delivery_delay_ms)
    }
}

impl ClientConfig {
    /// Load from the default config file
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file())
    }

    /// Load from a specific file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| SvclinkError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| SvclinkError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        tracing::debug!(
            "Loaded config from {}: package={}, version={}",
            path.display(),
            config.package_name,
            config.client_version
        );
        Ok(config)
    }

    /// Load from the default config file, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SvclinkError::config(e.to_string()))
    }
}
