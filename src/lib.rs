//! Single-port dispatch proxy.
//!
//! Routes each incoming HTTP/1.1 request to one of a small set of named
//! backends by path prefix. Plain requests are proxied; protocol upgrades
//! (WebSocket) are relayed and then spliced as raw bytes.

pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
