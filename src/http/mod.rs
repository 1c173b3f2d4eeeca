//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (HTTP/1.1 driver, one per client connection)
//!     → request.rs (classify plain vs upgrade, extract routing target)
//!     → [router decides backend]
//!     → forwarder.rs (pooled proxy, or handshake replay + splice)
//!     → response.rs (strip hop-by-hop, track body)
//!     → Send to client
//! ```

pub mod forwarder;
pub mod request;
pub mod response;
pub mod server;

pub use forwarder::Forwarder;
pub use server::{AppState, HttpServer, ServerError};
