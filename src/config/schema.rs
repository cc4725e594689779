//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the HA gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Service roles and their candidate backends.
    pub services: Vec<ServiceConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Body size limits for buffering.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// One service role: a static candidate list fronted by a path prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service role name, scoping the HA state (e.g. "LIVYSERVER").
    pub role: String,

    /// Path prefix routed to this service.
    pub path_prefix: String,

    /// Host header to match (exact match, case-insensitive).
    #[serde(default)]
    pub host: Option<String>,

    /// Remove `path_prefix` before forwarding.
    #[serde(default)]
    pub strip_prefix: bool,

    /// Candidate backend base URLs, in rotation order.
    pub urls: Vec<String>,

    /// Failover policy for this role.
    #[serde(default)]
    pub ha: HaConfig,
}

/// Failover policy for a service role.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HaConfig {
    /// When false the role is forwarded with a single attempt.
    pub enabled: bool,

    /// Failovers allowed per inbound request (0 = single attempt).
    pub max_failover_attempts: u32,

    /// Delay between attempts in milliseconds.
    pub failover_sleep_ms: u64,

    /// Status codes whose bodies are inspected for the standby marker.
    pub trigger_status_codes: Vec<u16>,

    /// Body substring identifying a standby instance.
    pub standby_body_marker: String,
}

impl Default for HaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failover_attempts: 3,
            failover_sleep_ms: 1000,
            trigger_status_codes: vec![403, 307],
            standby_body_marker: "This is a standby Livy Instance".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole inbound request, retries included, in seconds. Must cover the
    /// worst-case failover budget of every service.
    pub request_secs: u64,

    /// Single physical attempt against a backend, in seconds.
    pub attempt_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            attempt_secs: 10,
        }
    }
}

/// Buffering limits. Both legs are fully buffered before delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum inbound request body in bytes.
    pub max_body_bytes: usize,

    /// Maximum backend response body in bytes.
    pub max_response_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
            max_response_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

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
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// Bearer token required on every admin request. Must be set when enabled.
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml() {
        let raw = r#"
            [[services]]
            role = "LIVYSERVER"
            path_prefix = "/livy"
            urls = ["http://a:8998", "http://b:8998"]
        "#;
        let config: GatewayConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.services.len(), 1);

        let svc = &config.services[0];
        assert!(!svc.strip_prefix);
        assert!(svc.ha.enabled);
        assert_eq!(svc.ha.max_failover_attempts, 3);
        assert_eq!(svc.ha.trigger_status_codes, vec![403, 307]);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_ha_overrides() {
        let raw = r#"
            [[services]]
            role = "WEBHDFS"
            path_prefix = "/webhdfs"
            urls = ["http://nn1:50070"]

            [services.ha]
            max_failover_attempts = 0
            failover_sleep_ms = 0
            standby_body_marker = "StandbyException"
        "#;
        let config: GatewayConfig = toml::from_str(raw).unwrap();
        let ha = &config.services[0].ha;
        assert_eq!(ha.max_failover_attempts, 0);
        assert_eq!(ha.failover_sleep_ms, 0);
        assert_eq!(ha.standby_body_marker, "StandbyException");
        // Unset fields keep their defaults.
        assert_eq!(ha.trigger_status_codes, vec![403, 307]);
    }
}
