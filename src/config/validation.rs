//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing backends)
//! - Validate value ranges (timeouts > 0, ports valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::backend::{AddressError, BackendAddress};
use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no backends configured")]
    NoBackends,

    #[error("backend `{0}` is declared more than once")]
    DuplicateBackend(String),

    #[error("backend `{name}`: {source}")]
    BadBackendAddress { name: String, source: AddressError },

    #[error("backend name must not be empty")]
    EmptyBackendName,

    #[error("route `{route}` references unknown backend `{backend}`")]
    UnknownRouteBackend { route: String, backend: String },

    #[error("fallback backend `{0}` is not configured")]
    UnknownFallback(String),

    #[error("route `{0}` prefix must start with `/`")]
    BadPrefix(String),

    #[error("listener bind address `{0}` is not a socket address")]
    BadBindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("timeouts.connect_secs must be greater than zero")]
    ZeroConnectTimeout,

    #[error("metrics address `{0}` is not a socket address")]
    BadMetricsAddress(String),
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroConnectTimeout);
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::BadMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    let mut names = HashSet::new();
    for backend in &config.backends {
        if backend.name.is_empty() {
            errors.push(ValidationError::EmptyBackendName);
        } else if !names.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }
        if let Err(source) = BackendAddress::parse(&backend.address) {
            errors.push(ValidationError::BadBackendAddress {
                name: backend.name.clone(),
                source,
            });
        }
    }

    if !names.contains(config.routing.fallback.as_str()) {
        errors.push(ValidationError::UnknownFallback(
            config.routing.fallback.clone(),
        ));
    }

    for (index, route) in config.routes.iter().enumerate() {
        let label = route
            .name
            .clone()
            .unwrap_or_else(|| format!("route-{}", index));
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::BadPrefix(label.clone()));
        }
        if !names.contains(route.backend.as_str()) {
            errors.push(ValidationError::UnknownRouteBackend {
                route: label,
                backend: route.backend.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
