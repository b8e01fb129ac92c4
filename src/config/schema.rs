//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the console.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the web console.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// The `http.server` parameter group: file serving and digest auth.
    pub http_server: HttpServerConfig,

    /// Administrative password.
    pub password: PasswordConfig,

    /// Device identity used as session entropy.
    pub device: DeviceConfig,

    /// Session table settings.
    pub sessions: SessionConfig,

    /// Chunked transfer settings.
    pub transfer: TransferConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:80").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:80".to_string(),
            max_connections: 8,
        }
    }
}

/// File serving and digest authentication (`http.server.*` keys).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HttpServerConfig {
    /// Serve files from `docroot` for URIs without a registered page.
    pub enable_files: bool,

    /// Generate directory listings.
    pub enable_dirlist: bool,

    /// File server document root.
    pub docroot: String,

    /// Digest realm.
    pub auth_domain: String,

    /// Per directory credentials file name (no inheritance from parents).
    pub auth_file: String,

    /// Protect files with the global credentials file (user "admin").
    pub auth_global: bool,

    /// Location of the global credentials file.
    pub global_auth_file: String,

    /// URI patterns that are never served from the file system.
    pub protected_paths: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            enable_files: true,
            enable_dirlist: true,
            docroot: "/sd".to_string(),
            auth_domain: "webconsole".to_string(),
            auth_file: ".htpasswd".to_string(),
            auth_global: true,
            global_auth_file: "/store/.htpasswd".to_string(),
            protected_paths: vec!["/store/config".to_string()],
        }
    }
}

/// Administrative password.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct PasswordConfig {
    /// The password; empty means the console is open.
    pub module: String,

    /// Set once the administrator changed the password through the console.
    pub changed: bool,
}

impl PasswordConfig {
    /// True when an administrative password is configured.
    pub fn is_set(&self) -> bool {
        !self.module.is_empty()
    }
}

/// Device identity.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Hardware serial number.
    pub serial: String,
}

/// Session table configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of session slots.
    pub capacity: usize,

    /// Idle time after which a session expires.
    pub ttl_secs: u64,

    /// Maintenance tick interval in milliseconds.
    pub check_interval_ms: u64,

    /// Name of the session cookie.
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            ttl_secs: 3600,
            check_interval_ms: 500,
            cookie_name: "webconsole_session".to_string(),
        }
    }
}

/// Response streaming and request size limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum bytes emitted per send-ready event.
    pub chunk_size: usize,

    /// Maximum accepted request body in bytes.
    pub max_request_body: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            max_request_body: 16 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed until the response head is produced, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [password]
            module = "secret"
            "#,
        )
        .unwrap();

        assert!(config.password.is_set());
        assert!(!config.password.changed);
        assert_eq!(config.sessions.capacity, 5);
        assert_eq!(config.http_server.auth_file, ".htpasswd");
        assert_eq!(config.transfer.chunk_size, 1024);
    }

    #[test]
    fn http_server_keys_parse() {
        let config: ServerConfig = toml::from_str(
            r#"
            [http_server]
            enable_files = false
            docroot = "/www"
            auth_domain = "car"
            "#,
        )
        .unwrap();

        assert!(!config.http_server.enable_files);
        assert!(config.http_server.enable_dirlist);
        assert_eq!(config.http_server.docroot, "/www");
        assert_eq!(config.http_server.auth_domain, "car");
    }
}
