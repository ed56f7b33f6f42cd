//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tunnel.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for one tunnel endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TunnelConfig {
    /// Which side of the tunnel this process runs.
    pub mode: Mode,

    /// Outbound forwarder settings.
    pub forward: ForwardConfig,

    /// Inbound receiver settings.
    pub receive: ReceiveConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Side of the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Accept HTTP and send it over the stream service.
    #[default]
    Forward,
    /// Serve the stream service and hand requests to a local backend.
    Receive,
}

/// Outbound forwarder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// HTTP bind address (e.g., "0.0.0.0:8080").
    pub listen_address: String,

    /// Stream service endpoint (e.g., "http://127.0.0.1:50051").
    pub upstream: String,

    /// Maximum request body bytes per chunk message.
    pub chunk_size: usize,

    /// Connection establishment timeout.
    pub connect_timeout_secs: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
            upstream: "http://127.0.0.1:50051".to_string(),
            chunk_size: crate::forward::DEFAULT_CHUNK_SIZE,
            connect_timeout_secs: 5,
        }
    }
}

/// Inbound receiver configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Stream service bind address.
    pub listen_address: String,

    /// Local HTTP backend requests are proxied to (`host:port`).
    pub backend_address: String,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:50051".to_string(),
            backend_address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive, overridden by `RUST_LOG`.
    pub log_filter: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "http_tunnel=info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
