//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - Built-in defaults
//!
//! Timing values are milliseconds and deliberately `u16`: record ageing
//! uses a 16-bit elapsed counter, so every threshold must fit it.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::{REQUEST_KEY, SESSION_KEY_LEN};
use crate::error::{LinkError, Result};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Handshake and maintenance timing.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Integrity footer and key material.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Fixed table capacities.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| LinkError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| LinkError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PEERLINK_DISCOVERY_PERIOD_MS") {
            if let Ok(val) = val.parse() {
                config.timing.discovery_period_ms = val;
            }
        }
        if let Ok(val) = std::env::var("PEERLINK_SWEEP_PERIOD_MS") {
            if let Ok(val) = val.parse() {
                config.timing.sweep_period_ms = val;
            }
        }
        if let Ok(val) = std::env::var("PEERLINK_DELETE_THRESHOLD_MS") {
            if let Ok(val) = val.parse() {
                config.timing.delete_threshold_ms = val;
            }
        }
        if let Ok(val) = std::env::var("PEERLINK_FOOTER_ENABLED") {
            if let Ok(val) = val.parse() {
                config.security.footer_enabled = val;
            }
        }
        if let Ok(val) = std::env::var("PEERLINK_MAX_CONNECTIONS") {
            if let Ok(val) = val.parse() {
                config.limits.max_connections = val;
            }
        }

        config
    }

    /// Sanity-check the timing relationships.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timing;
        if t.heartbeat_threshold_ms >= t.delete_threshold_ms {
            return Err(LinkError::Config(
                "heartbeat threshold must be below the delete threshold".to_string(),
            ));
        }
        if t.sweep_period_ms == 0 || t.discovery_period_ms == 0 {
            return Err(LinkError::Config(
                "timer periods must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handshake and maintenance timing (milliseconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Discovery re-broadcast period while a client looks for a server.
    pub discovery_period_ms: u16,

    /// Maintenance sweep period.
    pub sweep_period_ms: u16,

    /// Extra delay before the first sweep, giving initial connections
    /// time to establish.
    pub sweep_initial_grace_ms: u16,

    /// Idle time after which a connected record emits heartbeats.
    pub heartbeat_threshold_ms: u16,

    /// Idle time after which an in-progress handshake is abandoned.
    pub connect_timeout_ms: u16,

    /// Idle time after which a connected session is evicted.
    pub delete_threshold_ms: u16,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            discovery_period_ms: 500,
            sweep_period_ms: 1000,
            sweep_initial_grace_ms: 2000,
            heartbeat_threshold_ms: 3000,
            connect_timeout_ms: 4000,
            delete_threshold_ms: 10000,
        }
    }
}

impl TimingConfig {
    /// Discovery period as a [`Duration`].
    pub fn discovery_period(&self) -> Duration {
        Duration::from_millis(u64::from(self.discovery_period_ms))
    }

    /// Sweep period as a [`Duration`].
    pub fn sweep_period(&self) -> Duration {
        Duration::from_millis(u64::from(self.sweep_period_ms))
    }

    /// Delay before the first sweep.
    pub fn first_sweep_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.sweep_period_ms) + u64::from(self.sweep_initial_grace_ms))
    }
}

/// Integrity footer and key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Append and validate the 4-byte integrity footer. When disabled,
    /// frames omit the trailing bytes and no validation occurs.
    pub footer_enabled: bool,

    /// Pre-shared request key for Discovery/Advertise validation and as
    /// the session-key derivation base. Per-deployment rotation happens
    /// here; the compiled-in value is only a default.
    pub request_key: [u8; SESSION_KEY_LEN],
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            footer_enabled: true,
            request_key: REQUEST_KEY,
        }
    }
}

/// Fixed table capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Connection table slots.
    pub max_connections: usize,

    /// Protocol registry slots.
    pub max_protocols: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            max_protocols: 4,
        }
    }
}
