//! Uplink configuration.
//!
//! A plain options struct: the embedding application decides where it comes
//! from (most firmware images bake it in; hosts can load the TOML form via
//! [`UplinkConfig::load_from_file`]). Validation runs once at `begin()`:
//! a configuration that cannot work, like a missing credential for the
//! selected authentication mode, is a setup error, never a retry.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How the client authenticates against the broker. Both modes run over TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Mutual TLS with a client certificate and key.
    Certificate,
    /// TLS with username/password credentials.
    #[default]
    UsernamePassword,
}

/// Connection and buffering options for [`crate::uplink::UplinkClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkConfig {
    /// Broker host name or address.
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Client identifier; generated when absent.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Root CA bundle, PEM. Optional for username/password mode, where the
    /// platform trust store is used instead.
    #[serde(default)]
    pub root_ca: Option<String>,
    /// Client certificate, PEM. Required in certificate mode.
    #[serde(default)]
    pub client_cert: Option<String>,
    /// Client private key, PEM. Required in certificate mode.
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub auth_mode: AuthMode,
    /// Delay between reconnection attempts in milliseconds.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// How long a publish may wait for broker acknowledgement, milliseconds.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    /// Consecutive failed connect attempts before the persistent-failure
    /// escalation fires. Retrying continues past it.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Capacity of the offline publish buffer.
    #[serde(default = "default_publish_buffer_size")]
    pub publish_buffer_size: usize,
}

fn default_port() -> u16 {
    8883
}

fn default_reconnect_interval_ms() -> u64 {
    5000
}

fn default_publish_timeout_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    5
}

fn default_publish_buffer_size() -> usize {
    5
}

/// Configuration errors. Surfaced once at `begin()`; never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl UplinkConfig {
    /// Minimal config for `server:port` with everything else defaulted.
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        UplinkConfig {
            server: server.into(),
            port,
            client_id: None,
            username: None,
            password: None,
            root_ca: None,
            client_cert: None,
            client_key: None,
            auth_mode: AuthMode::default(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            max_retries: default_max_retries(),
            publish_buffer_size: default_publish_buffer_size(),
        }
    }

    /// Load and validate a TOML configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: UplinkConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the options for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.is_empty() {
            return Err(ConfigError::Invalid("server must not be empty".into()));
        }
        match self.auth_mode {
            AuthMode::Certificate => {
                for (field, value) in [
                    ("root_ca", &self.root_ca),
                    ("client_cert", &self.client_cert),
                    ("client_key", &self.client_key),
                ] {
                    if value.as_deref().map_or(true, str::is_empty) {
                        return Err(ConfigError::Invalid(format!(
                            "certificate auth requires {field}"
                        )));
                    }
                }
            }
            AuthMode::UsernamePassword => {
                if self.username.as_deref().map_or(true, str::is_empty)
                    || self.password.is_none()
                {
                    return Err(ConfigError::Invalid(
                        "username/password auth requires username and password".into(),
                    ));
                }
            }
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.publish_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "publish_buffer_size must be at least 1".into(),
            ));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}
