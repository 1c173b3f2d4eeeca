//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Pick the backend name for a request target
//! - Fall back to a designated backend when nothing matches
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan (acceptable for typical route counts)
//! - Every referenced backend is checked against the registry up front

use crate::backend::{BackendRegistry, RegistryError};
use crate::config::{RouteConfig, RoutingConfig};
use crate::routing::matcher::{self, Matcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub prefix: String,
    pub backend: String,
    matcher: Box<dyn Matcher>,
}

impl Route {
    pub fn matches(&self, target: &str) -> bool {
        self.matcher.matches(target)
    }
}

/// Ordered prefix routes plus a fallback backend.
#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
    fallback: String,
}

impl Router {
    /// Compile routes. Fails if any route or the fallback names an
    /// unregistered backend.
    pub fn from_config(
        routes: &[RouteConfig],
        routing: &RoutingConfig,
        registry: &BackendRegistry,
    ) -> Result<Self, RegistryError> {
        if !registry.contains(&routing.fallback) {
            return Err(RegistryError::NotFound(routing.fallback.clone()));
        }

        let mut compiled = Vec::with_capacity(routes.len());
        for (index, route) in routes.iter().enumerate() {
            if !registry.contains(&route.backend) {
                return Err(RegistryError::NotFound(route.backend.clone()));
            }
            compiled.push(Route {
                name: route
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("route-{}", index)),
                prefix: route.path_prefix.clone(),
                backend: route.backend.clone(),
                matcher: matcher::compile(&route.path_prefix, routing.match_mode),
            });
        }

        tracing::info!(
            routes = compiled.len(),
            fallback = %routing.fallback,
            match_mode = ?routing.match_mode,
            "Router compiled"
        );

        Ok(Self {
            routes: compiled,
            fallback: routing.fallback.clone(),
        })
    }

    /// First route whose prefix matches, if any.
    pub fn matching_route(&self, target: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(target))
    }

    /// Backend name for a request target.
    pub fn decide(&self, target: &str) -> &str {
        self.matching_route(target)
            .map(|route| route.backend.as_str())
            .unwrap_or(self.fallback.as_str())
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }
}
