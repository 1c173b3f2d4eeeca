//! Request classification.
//!
//! # Responsibilities
//! - Tell plain requests from protocol-upgrade requests
//! - Extract the routing target (path plus query)
//! - Build backend URIs without touching anything else in the request
//!
//! # Design Decisions
//! - Upgrade means HTTP/1.1 + `Upgrade` header + `upgrade` token in `Connection`
//! - A target that does not start with `/` cannot be routed

use axum::http::header::{HeaderMap, CONNECTION, UPGRADE};
use axum::http::uri::{PathAndQuery, Uri};
use axum::http::{Request, Version};

use crate::backend::BackendTarget;
use crate::error::ProxyError;

/// True if any `Connection` header lists `token` (case-insensitive).
pub fn connection_has_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// True for an HTTP/1.1 protocol-switch request.
pub fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    req.version() == Version::HTTP_11
        && req.headers().contains_key(UPGRADE)
        && connection_has_token(req.headers(), "upgrade")
}

/// Protocol named in the `Upgrade` header, for logging.
pub fn upgrade_protocol<B>(req: &Request<B>) -> Option<&str> {
    req.headers().get(UPGRADE).and_then(|v| v.to_str().ok())
}

/// Path plus query the router decides on.
///
/// Origin-form and absolute-form targets are routable; authority-form
/// (`CONNECT host:port`) and asterisk-form (`OPTIONS *`) are not.
pub fn routing_target<B>(req: &Request<B>) -> Result<&str, ProxyError> {
    let uri = req.uri();
    let target = uri.path_and_query().map(PathAndQuery::as_str).unwrap_or("");

    if target.starts_with('/') {
        Ok(target)
    } else if target.is_empty() && uri.scheme().is_some() {
        // `GET http://host HTTP/1.1`
        Ok("/")
    } else {
        Err(ProxyError::ProtocolDesync(uri.to_string()))
    }
}

/// Origin-form copy of `uri` (`/path?query`).
pub fn origin_form(uri: &Uri) -> Uri {
    match uri.path_and_query() {
        Some(pq) if pq.as_str().starts_with('/') => Uri::from(pq.clone()),
        _ => Uri::from_static("/"),
    }
}

/// Absolute URI pointing the same path and query at `backend`.
pub fn backend_uri(backend: &BackendTarget, uri: &Uri) -> Result<Uri, ProxyError> {
    let path_and_query = uri
        .path_and_query()
        .filter(|pq| pq.as_str().starts_with('/'))
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    Uri::builder()
        .scheme("http")
        .authority(backend.address.authority().as_str())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::ProtocolDesync(e.to_string()))
}
