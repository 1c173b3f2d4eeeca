//! Per-exchange error kinds.
//!
//! Every variant is scoped to one in-flight exchange. None of them reach the
//! accept loop; startup failures live in `config` and `backend::registry`.

use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors raised while proxying one request or tunnel.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Router picked a name the registry does not know. Startup validation
    /// makes this unreachable in practice.
    #[error("backend `{0}` is not registered")]
    BackendUnresolvable(String),

    /// TCP connect failed or timed out.
    #[error("backend {address} unreachable: {reason}")]
    BackendUnreachable { address: String, reason: String },

    /// Backend accepted the connection but sent no response head in time.
    #[error("backend {address} did not respond within {secs}s")]
    BackendTimeout { address: String, secs: u64 },

    /// Client went away mid-flight. Normal termination.
    #[error("client disconnected: {0}")]
    ClientDisconnected(String),

    /// No routable path in the request target.
    #[error("cannot extract a path from request target `{0}`")]
    ProtocolDesync(String),

    /// Backend spoke invalid HTTP or dropped the exchange.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl ProxyError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BackendUnresolvable(_) => "unresolvable",
            Self::BackendUnreachable { .. } => "unreachable",
            Self::BackendTimeout { .. } => "timeout",
            Self::ClientDisconnected(_) => "client_disconnected",
            Self::ProtocolDesync(_) => "protocol_desync",
            Self::Upstream(_) => "upstream",
        }
    }

    /// True when the failure is attributable to the backend.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::BackendUnreachable { .. } | Self::BackendTimeout { .. } | Self::Upstream(_)
        )
    }

    /// Status returned to a plain-request client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BackendUnresolvable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendUnreachable { .. } | Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::ProtocolDesync(_) => StatusCode::BAD_REQUEST,
            // Nobody is left to read it.
            Self::ClientDisconnected(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::BackendUnresolvable(_) => "No backend configured for this route",
            Self::BackendUnreachable { .. } => "Backend unreachable",
            Self::BackendTimeout { .. } => "Backend timed out",
            Self::Upstream(_) => "Upstream request failed",
            Self::ProtocolDesync(_) | Self::ClientDisconnected(_) => "Bad request",
        };
        (self.status(), message).into_response()
    }
}

/// True for I/O errors that just mean the peer hung up.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let unreachable = ProxyError::BackendUnreachable {
            address: "127.0.0.1:1".into(),
            reason: "refused".into(),
        };
        assert_eq!(unreachable.status(), StatusCode::BAD_GATEWAY);
        assert!(unreachable.is_backend_failure());

        let timeout = ProxyError::BackendTimeout {
            address: "127.0.0.1:1".into(),
            secs: 3,
        };
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let desync = ProxyError::ProtocolDesync("*".into());
        assert_eq!(desync.status(), StatusCode::BAD_REQUEST);
        assert!(!desync.is_backend_failure());
    }

    #[test]
    fn into_response_carries_status() {
        let response = ProxyError::Upstream("reset".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn disconnect_kinds() {
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
