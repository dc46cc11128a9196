//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::tamper::FilterCatalog;

/// Root configuration for the tampering proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// The single destination every connection is proxied to.
    pub upstream: UpstreamConfig,

    /// Filter selection settings.
    pub tamper: TamperConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4080".to_string(),
            max_connections: 1024,
        }
    }
}

/// Upstream destination.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    pub host: String,
    pub port: u16,
}

impl UpstreamConfig {
    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 80,
        }
    }
}

/// Filter selection settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TamperConfig {
    /// Upper bound on filters applied per response.
    pub max_filters: usize,

    /// Apply filters in catalog order instead of a random order.
    pub retain_order: bool,

    /// Filters enabled for this process, in catalog order.
    pub filters: Vec<String>,
}

impl Default for TamperConfig {
    fn default() -> Self {
        Self {
            max_filters: 3,
            retain_order: false,
            filters: FilterCatalog::standard_names()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Whole-session timeout (request relay through response delivery) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_cli() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:4080");
        assert_eq!(config.upstream.address(), "localhost:80");
        assert_eq!(config.tamper.max_filters, 3);
        assert!(!config.tamper.retain_order);
        assert_eq!(config.tamper.filters, ["ShuffleHeaderOrder", "RandomizeHeaderCase"]);
    }

    #[test]
    fn upstream_address_brackets_ipv6() {
        let upstream = UpstreamConfig {
            host: "::1".into(),
            port: 8000,
        };
        assert_eq!(upstream.address(), "[::1]:8000");
    }
}
