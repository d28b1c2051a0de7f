//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Enforce loopback-only listener and backend addresses
//! - Validate value ranges (limits and timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: {addr} is not a loopback address")]
    NotLoopback { field: &'static str, addr: SocketAddr },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("observability.log_level: unknown level {0:?}")]
    UnknownLogLevel(String),

    #[error("backend.address {0} is the proxy's own listening address")]
    BackendIsListener(SocketAddr),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listen = loopback_address(
        "listener.bind_address",
        &config.listener.bind_address,
        &mut errors,
    );
    let backend = loopback_address("backend.address", &config.backend.address, &mut errors);

    if let (Some(listen), Some(backend)) = (listen, backend) {
        if listen.port() != 0 && listen == backend {
            errors.push(ValidationError::BackendIsListener(backend));
        }
    }

    if config.listener.max_header_bytes == 0 {
        errors.push(ValidationError::Zero {
            field: "listener.max_header_bytes",
        });
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "timeouts.connect_secs",
        });
    }

    if tracing::Level::from_str(&config.observability.log_level).is_err() {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn loopback_address(
    field: &'static str,
    value: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<SocketAddr> {
    let Ok(addr) = value.parse::<SocketAddr>() else {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
        return None;
    };

    if !addr.ip().is_loopback() {
        errors.push(ValidationError::NotLoopback { field, addr });
        return None;
    }
    Some(addr)
}
