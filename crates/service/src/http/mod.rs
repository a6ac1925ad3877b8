//! HTTP surface of the pod: one fallback handler for every resource path
//! plus a small status tree.

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use http::header::{self, HeaderName, HeaderValue};
use http::Method;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;

mod cors;
mod error;
mod health;
mod router;

pub use error::RequestError;

use crate::ServiceState;
use cors::PreflightCorsLayer;

/// Status endpoints live under the well-known tree so they can never
/// shadow a pod resource.
pub const STATUS_PREFIX: &str = "/.well-known/pod";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    // log level for http tracing
    pub log_level: tracing::Level,
    pub cors_origin: Option<String>,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn new(listen_addr: SocketAddr, cors_origin: Option<String>, max_body_bytes: usize) -> Self {
        tracing::info!(
            "Creating HTTP server Config: listen_addr={}, cors_origin={:?}",
            listen_addr,
            cors_origin
        );
        Self {
            listen_addr,
            log_level: tracing::Level::INFO,
            cors_origin,
            max_body_bytes,
        }
    }

    pub fn with_log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = level;
        self
    }
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let exposed = [
        header::LOCATION,
        header::ETAG,
        header::LINK,
        header::ALLOW,
        header::LAST_MODIFIED,
        header::WWW_AUTHENTICATE,
        HeaderName::from_static("wac-allow"),
        HeaderName::from_static("accept-patch"),
    ];
    let allow_origin = match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "ignoring invalid CORS origin, allowing any");
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::OPTIONS,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
        .expose_headers(exposed)
        .allow_origin(allow_origin)
}

/// The full pod router, without a listener attached.
pub fn router(state: ServiceState, config: &Config) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(config.log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    Router::new()
        .nest(STATUS_PREFIX, health::router(state.clone()))
        .fallback(router::handler)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(PreflightCorsLayer::new(cors_layer(
            config.cors_origin.as_deref(),
        )))
        .with_state(state)
        .layer(trace_layer)
}

pub async fn run(
    config: Config,
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let listen_addr = config.listen_addr;
    let pod_router = router(state, &config);

    tracing::info!(addr = ?listen_addr, "pod server listening");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    axum::serve(listener, pod_router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
