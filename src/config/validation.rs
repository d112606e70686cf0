//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ratios in range, windows non-zero)
//! - Check the allow-list and base path are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: StreamProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::StreamProxyConfig;

/// One semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("stream.allowed_hosts is empty")]
    NoAllowedHosts,

    #[error("stream.allowed_hosts entry {0:?} must be a lowercase hostname")]
    InvalidHost(String),

    #[error("stream.base_path {0:?} must start with '/' and not end with '/'")]
    InvalidBasePath(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("pool.prewarm_ratio must be between 0 and 1")]
    PrewarmRatio,

    #[error("listener address {0:?} is not a valid socket address")]
    ListenerAddress(String),

    #[error("upstream.ca_file is required when accept_invalid_certs is false")]
    MissingTrustRoots,
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &StreamProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.stream.allowed_hosts.is_empty() {
        errors.push(ValidationError::NoAllowedHosts);
    }
    for host in &config.stream.allowed_hosts {
        let valid = !host.is_empty()
            && *host == host.to_lowercase()
            && !host.contains(['/', ':', ' ']);
        if !valid {
            errors.push(ValidationError::InvalidHost(host.clone()));
        }
    }

    let base = &config.stream.base_path;
    if !base.is_empty() && (!base.starts_with('/') || base.ends_with('/')) {
        errors.push(ValidationError::InvalidBasePath(base.clone()));
    }

    let durations = [
        ("pool.max_age_secs", config.pool.max_age_secs),
        ("pool.ping_interval_secs", config.pool.ping_interval_secs),
        ("upstream.connect_timeout_secs", config.upstream.connect_timeout_secs),
        ("upstream.idle_timeout_secs", config.upstream.idle_timeout_secs),
    ];
    for (name, value) in durations {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }
    if config.upstream.initial_window_size == 0 {
        errors.push(ValidationError::Zero("upstream.initial_window_size"));
    }

    let ratio = config.pool.prewarm_ratio;
    if !(ratio > 0.0 && ratio < 1.0) {
        errors.push(ValidationError::PrewarmRatio);
    }

    if !config.upstream.accept_invalid_certs && config.upstream.ca_file.is_none() {
        errors.push(ValidationError::MissingTrustRoots);
    }

    let address = config.listener.socket_address();
    if address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::ListenerAddress(address));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
