// src/config.rs

//! Manages gateway configuration: loading from TOML, defaults, and validation.

use crate::core::protocol::header::MIN_HEADER_LEN;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Frame decoding settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProtocolConfig {
    /// The largest escaped frame accepted between two delimiters.
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,
    /// Reject frames whose trailing check code does not match.
    #[serde(default = "default_verify_check_code")]
    pub verify_check_code: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame_length: default_max_frame_length(),
            verify_check_code: default_verify_check_code(),
        }
    }
}

fn default_max_frame_length() -> usize {
    crate::core::protocol::frame::DEFAULT_MAX_FRAME_LENGTH
}
fn default_verify_check_code() -> bool {
    true
}

/// Session lifecycle settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionConfig {
    /// Close a connection that stays silent this long. `0s` disables the check.
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// When a terminal id is bound to a new connection, also close the old one.
    #[serde(default)]
    pub close_superseded: bool,
    /// Per-connection queue of messages waiting to be written to the terminal.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            close_superseded: false,
            outbound_queue_capacity: default_outbound_queue_capacity(),
        }
    }
}

impl SessionConfig {
    /// The idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (!self.idle_timeout.is_zero()).then_some(self.idle_timeout)
    }
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(20 * 60)
}
fn default_outbound_queue_capacity() -> usize {
    64
}

/// Configuration for TLS encryption.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cert_path")]
    pub cert_path: String,
    #[serde(default = "default_key_path")]
    pub key_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

fn default_cert_path() -> String {
    "jt808d.crt".to_string()
}
fn default_key_path() -> String {
    "jt808d.key".to_string()
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9808
}

/// The validated gateway configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    6808
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_connections() -> usize {
    10000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_connections: default_max_connections(),
            protocol: ProtocolConfig::default(),
            session: SessionConfig::default(),
            tls: TlsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(anyhow!("max_connections cannot be 0"));
        }

        // Header plus check code is the smallest message worth framing.
        let min_frame = MIN_HEADER_LEN + 1;
        if self.protocol.max_frame_length < min_frame {
            return Err(anyhow!(
                "protocol.max_frame_length must be at least {min_frame}"
            ));
        }
        if !self.protocol.verify_check_code {
            warn!("protocol.verify_check_code is disabled; corrupted frames will be dispatched.");
        }

        if self.session.outbound_queue_capacity == 0 {
            return Err(anyhow!("session.outbound_queue_capacity cannot be 0"));
        }
        if self.session.idle_timeout().is_none() {
            warn!("session.idle_timeout is 0; silent connections are never closed.");
        }

        if self.tls.enabled {
            if self.tls.cert_path.trim().is_empty() {
                return Err(anyhow!("tls.cert_path cannot be empty when TLS is enabled"));
            }
            if self.tls.key_path.trim().is_empty() {
                return Err(anyhow!("tls.key_path cannot be empty when TLS is enabled"));
            }
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }
}
