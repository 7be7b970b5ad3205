//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::chain::ServiceId;
use crate::security::blacklist::BlacklistAction;

/// Root configuration for the virtual-host server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind addresses, TLS, pool capacity).
    pub listener: ListenerConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Session store settings.
    pub sessions: SessionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Domain used when the Host header matches no configured domain.
    pub default_domain: Option<String>,

    /// Virtual hosts.
    pub domains: Vec<DomainConfig>,

    /// Static blacklist entries applied at startup and on reload.
    pub blacklist: Vec<BlacklistEntry>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plain HTTP bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS listener.
    pub tls: Option<TlsConfig>,

    /// Capacity of the connection slot pool, shared by all listeners.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 1_024,
        }
    }
}

/// TLS configuration for the secure listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// HTTPS bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Limits enforced while a request is being assembled.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum bytes accumulated for one request (request line, headers and body).
    pub max_request_size: usize,

    /// Maximum number of header lines.
    pub max_header_count: usize,

    /// Maximum length of the request line.
    pub max_request_line: usize,

    /// Requests served on one connection before the server closes it (0 = unlimited).
    pub max_requests_per_connection: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 1024 * 1024, // 1MB
            max_header_count: 100,
            max_request_line: 8 * 1024,
            max_requests_per_connection: 0,
        }
    }
}

/// Timeout configuration for the connection states.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Inactivity deadline while a request is being received, in seconds.
    pub request_secs: u64,

    /// Idle deadline between requests on a keep-alive connection, in seconds.
    pub keep_alive_secs: u64,

    /// Deadline for writing one response, in seconds.
    pub write_secs: u64,

    /// How long shutdown waits for open connections to drain, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 15,
            keep_alive_secs: 60,
            write_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the session id.
    pub cookie_name: String,

    /// How often expired sessions are swept, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "VHSESSION".to_string(),
            sweep_interval_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Full,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Where runtime state is persisted.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Domain file loaded at startup (when present) and written at shutdown.
    pub domains_path: Option<String>,
}

/// Virtual host definition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DomainConfig {
    /// Primary host name, also the domain identifier.
    pub name: String,

    /// Additional host names served by this domain.
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Directory resources are served from.
    pub document_root: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Session lifetime in seconds, refreshed on every request.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Redirect target; requests are answered with a redirect when set.
    #[serde(default)]
    pub forward_url: Option<String>,

    /// File served for directory requests.
    #[serde(default = "default_index_file")]
    pub index_file: String,

    /// Ordered service chain. Empty means the built-in default chain.
    #[serde(default)]
    pub service_chain: Vec<ServiceId>,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            aliases: Vec::new(),
            document_root: String::new(),
            enabled: default_enabled(),
            session_timeout_secs: default_session_timeout(),
            forward_url: None,
            index_file: default_index_file(),
            service_chain: Vec::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_session_timeout() -> u64 {
    20 * 60
}

fn default_index_file() -> String {
    "index.html".to_string()
}

/// Static blacklist entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlacklistEntry {
    /// Client IP address.
    pub address: String,

    pub action: BlacklistAction,
}
