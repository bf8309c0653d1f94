//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum router around the dispatcher
//! - Wire up middleware (request id, tracing, timeout, HSTS)
//! - Bind plain or TLS listeners and serve until shutdown
//!
//! # Design Decisions
//! - The outer timeout covers both forwarding attempts plus retry delay
//! - TLS termination uses rustls; certificates come from an external
//!   credential store as PEM files
//! - HSTS is attached only when TLS termination is active

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::engine::Engine;
use crate::http::dispatch::dispatch;
use crate::lifecycle::Shutdown;

/// State injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// The inbound listener serving proxied traffic.
pub struct HttpServer {
    engine: Arc<Engine>,
    router: Router,
}

impl HttpServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        let router = Self::build_router(engine.clone());
        Self { engine, router }
    }

    fn build_router(engine: Arc<Engine>) -> Router {
        // Both attempts, the retry pause, and response handling must fit.
        let total_timeout = Duration::from_secs(engine.config.upstream.timeout_secs * 2 + 5);
        let hsts = engine
            .config
            .listener
            .tls
            .as_ref()
            .is_some_and(|tls| tls.hsts);

        let state = AppState {
            engine: engine.clone(),
        };
        let mut router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(total_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http());

        if hsts {
            router = router.layer(SetResponseHeaderLayer::if_not_present(
                header::STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_static("max-age=31536000; includeSubDomains"),
            ));
        }
        router
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(self, shutdown: Arc<Shutdown>) -> Result<(), std::io::Error> {
        let bind_address = &self.engine.config.listener.bind_address;

        match self.engine.config.listener.tls.clone() {
            Some(tls) => {
                let addr: SocketAddr = bind_address.parse().map_err(|e| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("invalid bind address {}: {}", bind_address, e),
                    )
                })?;
                let rustls_config =
                    RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                        .await
                        .map_err(|e| {
                            std::io::Error::new(
                                std::io::ErrorKind::InvalidInput,
                                format!("failed to load TLS material: {}", e),
                            )
                        })?;

                info!(address = %addr, "HTTPS listener starting");
                let handle = axum_server::Handle::new();
                let watcher = handle.clone();
                let mut shutdown_rx = shutdown.subscribe();
                tokio::spawn(async move {
                    let _ = shutdown_rx.recv().await;
                    watcher.graceful_shutdown(Some(Duration::from_secs(30)));
                });

                axum_server::bind_rustls(addr, rustls_config)
                    .handle(handle)
                    .serve(
                        self.router
                            .into_make_service_with_connect_info::<SocketAddr>(),
                    )
                    .await?;
            }
            None => {
                let listener = TcpListener::bind(bind_address).await?;
                info!(address = %listener.local_addr()?, "HTTP listener starting");

                let mut shutdown_rx = shutdown.subscribe();
                axum::serve(
                    listener,
                    self.router
                        .into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await?;
            }
        }

        info!("listener stopped");
        Ok(())
    }
}

/// Entry point for every proxied request.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> impl IntoResponse {
    dispatch(state.engine, addr, request).await
}

/// Serve one request through an engine without a listener. Used by
/// embedders and integration tests.
pub async fn serve_one(
    engine: Arc<Engine>,
    client_addr: SocketAddr,
    request: Request<Body>,
) -> Response<Body> {
    dispatch(engine, client_addr, request).await
}
