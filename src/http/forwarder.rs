//! Connection forwarder.
//!
//! # Responsibilities
//! - Proxy plain requests through a pooled HTTP/1.1 client
//! - Replay upgrade handshakes on a dedicated backend connection
//! - Splice client and backend streams once the backend switches protocols
//!
//! # Data Flow
//! ```text
//! plain:    request → strip hop-by-hop → pooled client → response (streamed)
//! upgrade:  request → raw TCP connect → handshake → 101 relayed
//!           → client stream ↔ splice ↔ backend stream
//! ```
//!
//! # Design Decisions
//! - No retries; a failing backend fails visibly
//! - Upgrade connections are never pooled
//! - WebSocket frames are never parsed

use std::error::Error as StdError;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, Version};
use hyper::client::conn::http1;
use hyper::upgrade::OnUpgrade;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};

use crate::config::{PoolConfig, TimeoutConfig};
use crate::error::{is_disconnect, ProxyError};
use crate::http::request::{backend_uri, origin_form};
use crate::http::response::{strip_hop_by_hop, TrackedBody};
use crate::net::connection::{ConnectionState, InFlightConnection};
use crate::net::splice::{splice, Side};
use crate::observability::metrics;

/// Forwards exchanges to the backend they were routed to.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    connect_timeout: Duration,
    response_timeout: Option<Duration>,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig, pool: &PoolConfig) -> Self {
        let connect_timeout = Duration::from_secs(timeouts.connect_secs);

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(pool.idle_timeout_secs))
            .pool_max_idle_per_host(pool.max_idle_per_host)
            .pool_timer(TokioTimer::new())
            .http1_preserve_header_case(true)
            .build(connector);

        let response_timeout = match timeouts.request_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            client,
            connect_timeout,
            response_timeout,
        }
    }

    /// Proxy a plain request. The returned response streams the backend body
    /// and keeps `conn` open until it is done.
    pub async fn forward_request(
        &self,
        mut conn: InFlightConnection,
        req: Request<Body>,
    ) -> Result<Response<Body>, ProxyError> {
        conn.transition(ConnectionState::Connecting);
        let backend = conn.backend().clone();

        let (mut parts, body) = req.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        parts.uri = backend_uri(&backend, &parts.uri)?;
        parts.version = Version::HTTP_11;

        let pending = self.client.request(Request::from_parts(parts, body));
        let result = match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, pending).await.map_err(|_| {
                ProxyError::BackendTimeout {
                    address: backend.address.to_string(),
                    secs: limit.as_secs(),
                }
            })?,
            None => pending.await,
        };

        let response = result.map_err(|e| {
            if e.is_connect() {
                ProxyError::BackendUnreachable {
                    address: backend.address.to_string(),
                    reason: error_chain(&e),
                }
            } else {
                ProxyError::Upstream(error_chain(&e))
            }
        })?;

        conn.transition(ConnectionState::PlainProxy);

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(
            parts,
            TrackedBody::wrap(Body::new(body), conn),
        ))
    }

    /// Proxy an upgrade request.
    ///
    /// The handshake is replayed on a fresh backend connection. A `101` is
    /// relayed and the streams spliced in a background task; any other
    /// status is relayed as an ordinary response.
    pub async fn forward_upgrade(
        &self,
        mut conn: InFlightConnection,
        mut req: Request<Body>,
    ) -> Result<Response<Body>, ProxyError> {
        conn.transition(ConnectionState::Connecting);
        let backend = conn.backend().clone();
        let client_upgrade = hyper::upgrade::on(&mut req);

        let stream = backend.address.connect(self.connect_timeout).await?;

        let (mut sender, connection) = http1::Builder::new()
            .preserve_header_case(true)
            .handshake::<_, Body>(TokioIo::new(stream))
            .await
            .map_err(|e| ProxyError::Upstream(error_chain(&e)))?;

        let label = conn.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.with_upgrades().await {
                tracing::debug!(connection_id = %label, error = %e, "Backend handshake connection failed");
            }
        });

        conn.transition(ConnectionState::Upgrading);
        *req.uri_mut() = origin_form(req.uri());

        let pending = sender.send_request(req);
        let result = match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, pending).await.map_err(|_| {
                ProxyError::BackendTimeout {
                    address: backend.address.to_string(),
                    secs: limit.as_secs(),
                }
            })?,
            None => pending.await,
        };
        let mut response = result.map_err(|e| ProxyError::Upstream(error_chain(&e)))?;

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            tracing::info!(
                connection_id = %conn,
                backend = %backend.name,
                status = %response.status(),
                "Backend declined upgrade"
            );
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            return Ok(Response::from_parts(
                parts,
                TrackedBody::wrap(Body::new(body), conn),
            ));
        }

        let backend_upgrade = hyper::upgrade::on(&mut response);
        tokio::spawn(tunnel(conn, client_upgrade, backend_upgrade));

        let (parts, _) = response.into_parts();
        Ok(Response::from_parts(parts, Body::empty()))
    }
}

/// Wait for both sides to hand over their streams, then splice them.
async fn tunnel(mut conn: InFlightConnection, client: OnUpgrade, backend: OnUpgrade) {
    let upgraded = tokio::try_join!(
        async {
            client
                .await
                .map_err(|e| ProxyError::ClientDisconnected(error_chain(&e)))
        },
        async {
            backend
                .await
                .map_err(|e| ProxyError::Upstream(error_chain(&e)))
        },
    );
    let (client_io, backend_io) = match upgraded {
        Ok(pair) => pair,
        Err(e) => {
            report_tunnel_error(&conn, "Upgrade abandoned before splice", &e);
            return;
        }
    };

    conn.transition(ConnectionState::Upgraded);
    tracing::info!(
        connection_id = %conn,
        peer = %conn.peer(),
        backend = %conn.backend().name,
        "Connection upgraded"
    );

    let report = splice(TokioIo::new(client_io), TokioIo::new(backend_io)).await;
    metrics::record_tunnel(
        &conn.backend().name,
        report.client_to_backend,
        report.backend_to_client,
    );

    match report.result {
        Err(e) => {
            let err = match e.side {
                Side::Client => ProxyError::ClientDisconnected(e.to_string()),
                Side::Backend if is_disconnect(&e.source) => ProxyError::BackendUnreachable {
                    address: conn.backend().address.to_string(),
                    reason: e.to_string(),
                },
                Side::Backend => ProxyError::Upstream(e.to_string()),
            };
            report_tunnel_error(&conn, "Tunnel failed", &err);
        }
        Ok(()) => tracing::info!(
            connection_id = %conn,
            backend = %conn.backend().name,
            closed_by = report.closed_by.as_str(),
            client_to_backend = report.client_to_backend,
            backend_to_client = report.backend_to_client,
            duration_ms = conn.elapsed().as_millis() as u64,
            "Tunnel closed"
        ),
    }
}

fn report_tunnel_error(conn: &InFlightConnection, message: &str, err: &ProxyError) {
    let backend = conn.backend().name.as_str();
    if err.is_backend_failure() {
        metrics::record_backend_failure(backend, err.kind());
        tracing::warn!(connection_id = %conn, backend, kind = err.kind(), error = %err, "{message}");
    } else {
        tracing::debug!(connection_id = %conn, backend, kind = err.kind(), error = %err, "{message}");
    }
}

/// Render an error with its sources, `outer: inner: root`.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        rendered.push_str(": ");
        rendered.push_str(&inner.to_string());
        source = inner.source();
    }
    rendered
}
