//! Backend subsystem.
//!
//! # Data Flow
//! ```text
//! BackendConfig[] (startup)
//!     → target.rs (validate host:port)
//!     → registry.rs (name → Arc<BackendTarget>)
//!     → shared read-only with router and forwarder
//! ```

pub mod registry;
pub mod target;

pub use registry::{BackendRegistry, RegistryError};
pub use target::{AddressError, BackendAddress, BackendTarget};
