//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.
//! Secrets (the shared backend credential) are deliberately absent: they are
//! read from the process environment at request time, never from disk.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the shield.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ShieldConfig {
    /// Deployment environment name ("production", "development", ...).
    /// Absent means the legacy single-environment deployment.
    pub environment: Option<String>,

    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Backend instance addressing.
    pub backend: BackendConfig,

    /// Identity verification for gated routes.
    pub identity: IdentityConfig,

    /// Parameters injected into every proxied request.
    pub injection: InjectionConfigFile,

    /// WebSocket relay settings.
    pub relay: RelayConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Scheduled instance probe.
    pub health: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080"). Read once at startup.
    pub bind_address: String,

    /// Maximum request body size forwarded to the backend. Reloadable.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Backend instance configuration.
///
/// `instances` maps a backend instance id (as derived from the environment
/// name) to a `host:port` address. When the resolved id has no entry,
/// `address` is used.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Fallback backend address.
    pub address: String,

    /// Explicit instance id -> address table.
    pub instances: BTreeMap<String, String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:18789".to_string(),
            instances: BTreeMap::new(),
        }
    }
}

/// Identity verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    /// Trust domain publishing the signing keys (e.g. "team.cloudflareaccess.com").
    pub trust_domain: Option<String>,

    /// Expected `aud` claim.
    pub audience: Option<String>,

    /// Skip verification entirely. Local development only.
    pub bypass: bool,

    /// Path patterns that require a verified identity.
    pub gated_paths: Vec<String>,

    /// Header carrying the signed assertion.
    pub assertion_header: String,

    /// Cookie carrying the signed assertion when the header is absent.
    pub assertion_cookie: String,

    /// Override for the key set URL. Defaults to
    /// `https://<trust_domain>/cdn-cgi/access/certs`.
    pub certs_url: Option<String>,

    /// Override for the expected issuer. Defaults to `https://<trust_domain>`.
    pub issuer: Option<String>,

    /// Key set time-to-live in seconds.
    pub key_ttl_secs: u64,

    /// Minimum spacing between forced (rotation) refreshes in seconds.
    pub min_refresh_interval_secs: u64,

    /// Key set fetch timeout in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            trust_domain: None,
            audience: None,
            bypass: false,
            gated_paths: vec![
                "/_admin/*".to_string(),
                "/api/*".to_string(),
                "/debug/*".to_string(),
            ],
            assertion_header: "cf-access-jwt-assertion".to_string(),
            assertion_cookie: "CF_Authorization".to_string(),
            certs_url: None,
            issuer: None,
            key_ttl_secs: 3600,
            min_refresh_interval_secs: 30,
            fetch_timeout_secs: 5,
        }
    }
}

/// Declarative injection table as it appears in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct InjectionConfigFile {
    pub params: Vec<ParamRule>,
}

impl Default for InjectionConfigFile {
    fn default() -> Self {
        Self {
            params: vec![ParamRule {
                source_key: "GATEWAY_TOKEN".to_string(),
                target_name: Some("token".to_string()),
                required: true,
                transform: None,
            }],
        }
    }
}

/// One row of the injection table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ParamRule {
    /// Key looked up in the environment source.
    pub source_key: String,

    /// Query parameter name written on the outbound URL.
    #[serde(default)]
    pub target_name: Option<String>,

    /// Whether absence aborts the request.
    #[serde(default)]
    pub required: bool,

    /// Optional built-in value transform.
    #[serde(default)]
    pub transform: Option<TransformKind>,
}

/// Built-in value transforms selectable from configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    Trim,
    Lowercase,
    Uppercase,
}

/// WebSocket relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Message substituted for backend error detail in frames sent to clients.
    pub client_error_message: String,

    /// Reason substituted in abnormal close frames sent to clients.
    pub client_close_reason: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            client_error_message: "The gateway encountered an error processing this request."
                .to_string(),
            client_close_reason: "Backend unavailable".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds. The HTTP
    /// connection pool reads it at startup; WebSocket dials and relay
    /// teardown read the current value.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds. Reloadable.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 120,
        }
    }
}

/// Scheduled instance probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the periodic probe.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Probe timeout in seconds.
    pub timeout_secs: u64,

    /// Backend path to probe.
    pub path: String,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            timeout_secs: 5,
            path: "/".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 1,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Emit debug events listing injected/skipped parameter names.
    pub log_injection: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            log_injection: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
