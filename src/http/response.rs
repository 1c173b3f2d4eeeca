//! Response handling.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers on the plain proxy path
//! - Keep an exchange open until its response body has been streamed
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Hop-by-hop headers stripped in both directions, including any header
//!   named by `Connection`
//! - Upgrade handshakes are relayed untouched

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderName, CONNECTION};
use hyper::body::{Body as HttpBody, Bytes, Frame, SizeHint};

use crate::net::connection::InFlightConnection;

/// Headers that describe one hop, never the end-to-end message.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers in place.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Response body that owns its exchange, so the exchange stays tracked
/// until the last frame is sent or the client goes away.
pub struct TrackedBody {
    inner: Body,
    _conn: InFlightConnection,
}

impl TrackedBody {
    pub fn wrap(inner: Body, conn: InFlightConnection) -> Body {
        Body::new(Self { inner, _conn: conn })
    }
}

impl HttpBody for TrackedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
