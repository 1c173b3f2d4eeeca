//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request target (path + query)
//!     → router.rs (ordered route scan)
//!     → matcher.rs (prefix comparison)
//!     → Return: backend name (matched route or fallback)
//!
//! Route Compilation (at startup):
//!     RouteConfig[] + RoutingConfig
//!     → Check backend names against the registry
//!     → Compile matchers in declaration order
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod router;

pub use router::{Route, Router};
