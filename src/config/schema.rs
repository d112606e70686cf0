//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the stream proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Upstream hosts used when `STREAM_HOSTS` is unset.
pub const DEFAULT_STREAM_HOSTS: [&str; 2] = ["livestream.bbnl.in", "livestream2.bbnl.in"];

/// Root configuration for the stream proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StreamProxyConfig {
    /// Listener configuration (standalone deployment only).
    pub listener: ListenerConfig,

    /// Allow-list and URL namespace.
    pub stream: StreamConfig,

    /// Session pool timings.
    pub pool: PoolConfig,

    /// Upstream dial and transfer settings.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind host (e.g., "0.0.0.0").
    pub bind_address: String,

    /// Listen port, overridden by `PORT`.
    pub port: u16,
}

impl ListenerConfig {
    /// Full socket address string.
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Which hosts may be proxied, and where the proxy is mounted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Lowercase upstream hostnames that may be dialed.
    pub allowed_hosts: Vec<String>,

    /// Application base path stripped before `/stream/` matching
    /// (e.g., "/app"). Empty for none.
    pub base_path: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: DEFAULT_STREAM_HOSTS.iter().map(|h| h.to_string()).collect(),
            base_path: String::new(),
        }
    }
}

/// Session pool timings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Sessions older than this are rotated.
    pub max_age_secs: u64,

    /// Fraction of `max_age_secs` after which a standby is pre-warmed.
    pub prewarm_ratio: f64,

    /// Liveness ping interval.
    pub ping_interval_secs: u64,

    /// Grace period before a rotated-out session is closed.
    pub drain_delay_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 600,
            prewarm_ratio: 0.8,
            ping_interval_secs: 30,
            drain_delay_secs: 45,
        }
    }
}

/// Upstream connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// TLS port on the upstream hosts.
    pub port: u16,

    /// HTTP/2 stream and connection flow-control window in bytes.
    pub initial_window_size: u32,

    /// TCP + TLS establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Idle timeout on an upstream request in seconds.
    pub idle_timeout_secs: u64,

    /// Skip certificate validation for upstream hosts.
    pub accept_invalid_certs: bool,

    /// PEM bundle of trusted roots, used when certificates are validated.
    pub ca_file: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            port: 443,
            initial_window_size: 8 * 1024 * 1024,
            connect_timeout_secs: 10,
            idle_timeout_secs: 30,
            accept_invalid_certs: true,
            ca_file: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
