//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, intervals > 0, address parses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("http_server.docroot must be set when file serving is enabled")]
    MissingDocroot,
    #[error("http_server.auth_file '{0}' must be a plain file name")]
    AuthFileName(String),
    #[error("sessions.cookie_name '{0}' is not a valid cookie name")]
    CookieName(String),
}

/// Check a configuration, collecting every error.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let counts = [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("sessions.capacity", config.sessions.capacity as u64),
        ("sessions.ttl_secs", config.sessions.ttl_secs),
        ("sessions.check_interval_ms", config.sessions.check_interval_ms),
        ("transfer.chunk_size", config.transfer.chunk_size as u64),
        ("transfer.max_request_body", config.transfer.max_request_body as u64),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    for (name, value) in counts {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }

    let http = &config.http_server;
    if http.enable_files && http.docroot.trim().is_empty() {
        errors.push(ValidationError::MissingDocroot);
    }
    if http.auth_file.is_empty() || http.auth_file.contains('/') || http.auth_file == ".." {
        errors.push(ValidationError::AuthFileName(http.auth_file.clone()));
    }

    let cookie = &config.sessions.cookie_name;
    let cookie_ok = !cookie.is_empty()
        && cookie
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if !cookie_ok {
        errors.push(ValidationError::CookieName(cookie.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
