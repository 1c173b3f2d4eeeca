//! Dispatch server.
//!
//! # Responsibilities
//! - Accept client connections on the single listening port
//! - Serve each connection with an HTTP/1.1 driver that supports upgrades
//! - Route every request once and hand it to the forwarder
//! - Keep per-connection failures away from the accept loop
//! - Drain in-flight exchanges on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use crate::backend::{BackendRegistry, RegistryError};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::forwarder::Forwarder;
use crate::http::request::{is_upgrade_request, routing_target, upgrade_protocol};
use crate::net::connection::{ConnectionContext, ConnectionTracker, InFlightConnection};
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::observability::metrics;
use crate::routing::Router;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("backend configuration: {0}")]
    Registry(#[from] RegistryError),

    #[error("listener: {0}")]
    Listener(#[from] ListenerError),
}

/// Shared, read-only state handed to every connection.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub registry: Arc<BackendRegistry>,
    pub forwarder: Forwarder,
    pub tracker: ConnectionTracker,
}

/// The single-port dispatch server.
pub struct HttpServer {
    state: AppState,
    config: ProxyConfig,
}

impl HttpServer {
    /// Build registry, router and forwarder. Any unresolvable backend is fatal.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let registry = BackendRegistry::from_config(&config.backends)?;
        let router = Router::from_config(&config.routes, &config.routing, &registry)?;
        let forwarder = Forwarder::new(&config.timeouts, &config.pool);

        let state = AppState {
            router: Arc::new(router),
            registry: Arc::new(registry),
            forwarder,
            tracker: ConnectionTracker::new(),
        };

        Ok(Self { state, config })
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %addr,
            backends = ?self.state.registry.names().collect::<Vec<_>>(),
            fallback = %self.state.router.fallback(),
            "Dispatch server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.serve_connection(stream, peer, permit),
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }
        drop(listener);

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        let remaining = self.state.tracker.drain(grace).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Grace period elapsed with exchanges still in flight");
        }

        tracing::info!("Dispatch server stopped");
        Ok(())
    }

    /// Spawn the HTTP/1.1 driver for one client connection.
    fn serve_connection(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let context = Arc::new(ConnectionContext::new(peer, Some(permit)));
        let state = self.state.clone();
        let keep_alive = self.config.listener.keep_alive;
        let header_read_timeout = match self.config.timeouts.header_read_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        tokio::spawn(async move {
            let _ = stream.set_nodelay(true);
            let id = context.id;

            let service_context = context.clone();
            let service = ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(DefaultOnFailure::new().level(Level::DEBUG)))
                .service(tower::service_fn(move |req: Request<Incoming>| {
                    dispatch(state.clone(), service_context.clone(), req.map(Body::new))
                }));

            let mut builder = http1::Builder::new();
            builder
                .preserve_header_case(true)
                .auto_date_header(false)
                .keep_alive(keep_alive)
                .timer(TokioTimer::new());
            if let Some(timeout) = header_read_timeout {
                builder.header_read_timeout(timeout);
            }

            let served = builder
                .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service))
                .with_upgrades()
                .await;

            match served {
                Ok(()) => tracing::trace!(connection_id = %id, "Client connection finished"),
                Err(e) => tracing::debug!(connection_id = %id, error = %e, "Client connection closed"),
            }
        });
    }
}

/// Route one request and forward it.
///
/// `Err` tells hyper to drop the client connection without a response,
/// which is how failed upgrades are terminated.
async fn dispatch(
    state: AppState,
    context: Arc<ConnectionContext>,
    req: Request<Body>,
) -> Result<Response<Body>, ProxyError> {
    let upgrade = is_upgrade_request(&req);

    let target = match routing_target(&req) {
        Ok(target) => target.to_string(),
        Err(e) => {
            tracing::warn!(connection_id = %context.id, peer = %context.peer, error = %e, upgrade, "Unroutable request");
            return if upgrade { Err(e) } else { Ok(e.into_response()) };
        }
    };

    let name = state.router.decide(&target);
    let backend = match state.registry.resolve(name) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(connection_id = %context.id, error = %e, "Router chose an unregistered backend");
            let e = ProxyError::BackendUnresolvable(name.to_string());
            return if upgrade { Err(e) } else { Ok(e.into_response()) };
        }
    };

    let conn = InFlightConnection::new(context.clone(), backend, &state.tracker);
    let backend_name = conn.backend().name.clone();
    let label = conn.to_string();
    let kind = if upgrade { "upgrade" } else { "plain" };

    tracing::info!(
        connection_id = %label,
        peer = %context.peer,
        method = %req.method(),
        target = %target,
        backend = %backend_name,
        kind,
        protocol = upgrade_protocol(&req).unwrap_or(""),
        "Routing decision"
    );
    metrics::record_route_decision(&backend_name, kind);

    if upgrade {
        state
            .forwarder
            .forward_upgrade(conn, req)
            .await
            .inspect_err(|e| report_failure(&label, &backend_name, e))
    } else {
        let start = Instant::now();
        let response = match state.forwarder.forward_request(conn, req).await {
            Ok(response) => response,
            Err(e) => {
                report_failure(&label, &backend_name, &e);
                e.into_response()
            }
        };
        metrics::record_request(&backend_name, response.status().as_u16(), start);
        Ok(response)
    }
}

fn report_failure(connection_id: &str, backend: &str, err: &ProxyError) {
    if err.is_backend_failure() {
        metrics::record_backend_failure(backend, err.kind());
        tracing::warn!(connection_id, backend, error = %err, kind = err.kind(), "Backend failure");
    } else {
        tracing::debug!(connection_id, backend, error = %err, "Exchange ended early");
    }
}
