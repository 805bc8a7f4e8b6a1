//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port, header buffer, health path)
//! - Resolve zero timeouts and sizes to their defaults
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: `&RouterConfig → Result<RouterConfig, Vec<ValidationError>>`
//! - Idempotent: validating a validated config yields the same config

use crate::config::schema::*;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("port {0} is outside 1..=65535")]
    InvalidPort(u32),

    #[error("max_header_bytes {0} is below the minimum of {MIN_MAX_HEADER_BYTES}")]
    HeaderBufferTooSmall(usize),

    #[error("health_path {0:?} must start with '/'")]
    InvalidHealthPath(String),

    #[error("host must not be empty")]
    EmptyHost,
}

/// Validate a router configuration and resolve defaults.
pub fn validate_config(config: &RouterConfig) -> Result<RouterConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut resolved = config.clone();

    if resolved.port == 0 || resolved.port > 65_535 {
        errors.push(ValidationError::InvalidPort(resolved.port));
    }
    if resolved.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if !resolved.health_path.starts_with('/') {
        errors.push(ValidationError::InvalidHealthPath(resolved.health_path.clone()));
    }

    default_if_zero(&mut resolved.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
    default_if_zero(&mut resolved.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS);
    default_if_zero(&mut resolved.idle_timeout_ms, DEFAULT_IDLE_TIMEOUT_MS);
    default_if_zero(&mut resolved.read_header_timeout_ms, DEFAULT_READ_HEADER_TIMEOUT_MS);
    default_if_zero(&mut resolved.max_header_bytes, DEFAULT_MAX_HEADER_BYTES);
    default_if_zero(&mut resolved.max_connections, DEFAULT_MAX_CONNECTIONS);
    default_if_zero(&mut resolved.axum.body_limit, DEFAULT_BODY_LIMIT);
    default_if_zero(&mut resolved.hyper.body_limit, DEFAULT_BODY_LIMIT);

    if resolved.max_header_bytes < MIN_MAX_HEADER_BYTES {
        errors.push(ValidationError::HeaderBufferTooSmall(resolved.max_header_bytes));
    }

    if errors.is_empty() {
        Ok(resolved)
    } else {
        Err(errors)
    }
}

fn default_if_zero<T: PartialEq + Default>(value: &mut T, default: T) {
    if *value == T::default() {
        *value = default;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_resolve_to_defaults() {
        let mut config = RouterConfig::default();
        config.read_timeout_ms = 0;
        config.idle_timeout_ms = 0;
        config.max_header_bytes = 0;
        config.hyper.body_limit = 0;

        let resolved = validate_config(&config).unwrap();
        assert_eq!(resolved.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
        assert_eq!(resolved.idle_timeout_ms, DEFAULT_IDLE_TIMEOUT_MS);
        assert_eq!(resolved.max_header_bytes, DEFAULT_MAX_HEADER_BYTES);
        assert_eq!(resolved.hyper.body_limit, DEFAULT_BODY_LIMIT);
    }

    #[test]
    fn validation_is_idempotent() {
        let mut config = RouterConfig::default();
        config.write_timeout_ms = 0;
        config.port = 3000;

        let once = validate_config(&config).unwrap();
        let twice = validate_config(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn collects_every_error() {
        let mut config = RouterConfig::default();
        config.port = 70_000;
        config.health_path = "health".into();
        config.max_header_bytes = 1024;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::InvalidPort(70_000)));
        assert!(errors.contains(&ValidationError::HeaderBufferTooSmall(1024)));
    }

    #[test]
    fn port_zero_is_rejected() {
        let mut config = RouterConfig::default();
        config.port = 0;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidPort(0)]
        );
    }
}
