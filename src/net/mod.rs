//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (ids, per-exchange state machine, drain tracking)
//!     → Hand off to HTTP layer
//!
//! After a successful upgrade:
//!     client stream ↔ splice.rs ↔ backend stream
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each exchange tracked for graceful shutdown
//! - Upgraded connections are plain byte pipes

pub mod connection;
pub mod listener;
pub mod splice;

pub use connection::{
    ConnectionContext, ConnectionId, ConnectionState, ConnectionTracker, InFlightConnection,
};
pub use listener::{ConnectionPermit, Listener, ListenerError};
