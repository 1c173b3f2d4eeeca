//! Backend registry.
//!
//! # Responsibilities
//! - Map logical backend names to their addresses
//! - Reject malformed addresses and duplicate names at startup
//! - Resolve names for the forwarder
//!
//! # Design Decisions
//! - Built once, never mutated; shared through `Arc` without locks
//! - Declaration order kept for logging and metrics

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::target::{AddressError, BackendAddress, BackendTarget};
use crate::config::BackendConfig;

/// Errors raised while building or querying the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("backend `{name}` has a malformed address: {source}")]
    MalformedAddress {
        name: String,
        #[source]
        source: AddressError,
    },

    #[error("backend `{0}` is declared more than once")]
    Duplicate(String),

    #[error("backend `{0}` is not registered")]
    NotFound(String),
}

/// Static name → target mapping.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    targets: HashMap<String, Arc<BackendTarget>>,
    order: Vec<String>,
}

impl BackendRegistry {
    /// Build the registry from configuration, failing on the first bad entry.
    pub fn from_config(configs: &[BackendConfig]) -> Result<Self, RegistryError> {
        let mut registry = Self::default();

        for config in configs {
            let address = BackendAddress::parse(&config.address).map_err(|source| {
                RegistryError::MalformedAddress {
                    name: config.name.clone(),
                    source,
                }
            })?;
            registry.insert(BackendTarget::new(config.name.clone(), address))?;
        }

        tracing::debug!(backends = ?registry.order, "Backend registry built");
        Ok(registry)
    }

    fn insert(&mut self, target: BackendTarget) -> Result<(), RegistryError> {
        if self.targets.contains_key(&target.name) {
            return Err(RegistryError::Duplicate(target.name));
        }
        self.order.push(target.name.clone());
        self.targets.insert(target.name.clone(), Arc::new(target));
        Ok(())
    }

    /// Look up a backend by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<BackendTarget>, RegistryError> {
        self.targets
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Backend names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
