//! License proxy HTTP server
//!
//! Each `POST /` runs the same pipeline: collect the full body, sign, forward
//! to the license server, translate, and answer 200 with a JSON
//! [`ProxyResponse`]. Application failures live in the body's `status`
//! field, never in the HTTP status. A request whose body never completes gets
//! no response at all: its connection is closed.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{
        header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN},
        HeaderValue, Request, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tower::ServiceExt;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::{LicenseServer, ProxyConfig};
use crate::error::{ClientError, Result};
use crate::signer;
use crate::translate::{translate, ProxyResponse};
use crate::upstream::UpstreamClient;

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "GET, PUT, POST, DELETE, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization, Content-Length, X-Requested-With";

/// Shared, read-only request pipeline state
pub struct ProxyState {
    /// Validated license server snapshot
    pub license_server: Arc<LicenseServer>,
    /// Outbound client
    pub upstream: UpstreamClient,
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

/// License proxy server
pub struct ProxyServer {
    config: ProxyConfig,
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// Validate configuration and build the server. Nothing is bound yet.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let license_server = config.validate()?;
        let upstream = UpstreamClient::new(
            &license_server,
            Duration::from_secs(config.server.timeout_seconds),
        )?;

        let state = Arc::new(ProxyState {
            license_server: Arc::new(license_server),
            upstream,
            max_body_bytes: config.server.max_body_bytes,
        });

        Ok(Self { config, state })
    }

    pub fn license_server(&self) -> &LicenseServer {
        &self.state.license_server
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        with_cors(
            Router::new()
                .route("/", post(license_handler).options(preflight_handler))
                .layer(TraceLayer::new_for_http())
                .with_state(self.state.clone()),
        )
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.config.server.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting proxy server on {}", listener.local_addr()?);
        info!("License server: {}", self.state.license_server);
        if self.state.license_server.signing_enabled() {
            info!("Request signing: enabled (signer = {})", self.state.license_server.provider);
        } else {
            info!("Request signing: disabled");
        }

        let router = self.router();
        let (drain_tx, drain_rx) = watch::channel(());
        tokio::pin!(shutdown);

        loop {
            let (stream, addr) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            tokio::spawn(serve_connection(stream, router.clone(), drain_rx.clone()));
            debug!("Accepted connection from {}", addr);
        }

        // Let in-flight connections finish their current request.
        drop(drain_rx);
        let _ = drain_tx.send(());
        drain_tx.closed().await;

        info!("Proxy server stopped");
        Ok(())
    }
}

async fn serve_connection(stream: TcpStream, router: Router, mut drain: watch::Receiver<()>) {
    let peer = stream.peer_addr().ok();
    let service = service_fn(move |req: Request<Incoming>| dispatch(router.clone(), req));
    let builder = Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    let result = loop {
        tokio::select! {
            result = conn.as_mut() => break result,
            _ = drain.changed(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    };

    if let Err(e) = result {
        debug!("Connection from {:?} closed: {}", peer, e);
    }
}

/// Run one request through the router. A response tagged with a
/// [`ClientError`] is turned into a service error so hyper closes the
/// connection without writing it.
async fn dispatch(
    router: Router,
    req: Request<Incoming>,
) -> std::result::Result<Response, ClientError> {
    let mut response = match router.oneshot(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    match response.extensions_mut().remove::<ClientError>() {
        Some(e) => Err(e),
        None => Ok(response),
    }
}

/// Apply the fixed CORS header set to every response of `router`
pub fn with_cors<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(CORS_ALLOW_ORIGIN),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        ))
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Sign, forward and translate one license challenge
pub async fn relay(state: &ProxyState, raw: &[u8]) -> ProxyResponse {
    let envelope = match signer::sign(raw, &state.license_server) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!("Failed to build license request: {}", e);
            return ProxyResponse::error(format!("Failed to build license request: {}", e));
        }
    };

    let result = state.upstream.forward(&envelope).await;
    if let Err(ref e) = result {
        warn!("Error in request to license server: {}", e);
    }
    translate(result)
}

async fn read_body(body: Body, limit: usize) -> std::result::Result<Bytes, ClientError> {
    let collected = Limited::new(body, limit).collect().await.map_err(|e| {
        if e.is::<LengthLimitError>() {
            ClientError::TooLarge(limit)
        } else {
            ClientError::Incomplete(e.to_string())
        }
    })?;

    let raw = collected.to_bytes();
    if raw.is_empty() {
        return Err(ClientError::Empty);
    }
    Ok(raw)
}

/// Main license handler
async fn license_handler(State(state): State<Arc<ProxyState>>, body: Body) -> Response {
    let raw = match read_body(body, state.max_body_bytes).await {
        Ok(raw) => raw,
        Err(e @ ClientError::Incomplete(_)) => {
            debug!("Dropping connection: {}", e);
            let mut response = Response::default();
            response.extensions_mut().insert(e);
            return response;
        }
        Err(e) => {
            warn!("Rejecting license request: {}", e);
            return json_response(&ProxyResponse::error(e.to_string()));
        }
    };

    info!("Request received! Data length = {}", raw.len());
    let response = relay(&state, &raw).await;
    debug!(status = ?response.status, "Responding to client");
    json_response(&response)
}

async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

fn json_response(resp: &ProxyResponse) -> Response {
    (StatusCode::OK, Json(resp)).into_response()
}
