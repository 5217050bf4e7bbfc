//! modelgate - streaming proxy and crash-safe model hot-swap
//!
//! Two cooperating subsystems in front of a local inference server: a data
//! plane that forwards every request and re-frames event-stream responses,
//! and a control plane that swaps the active model config atomically, with
//! a backup and automatic rollback when the backend never becomes ready.

use axum::Router;
use axum::routing::any;
use axum_prometheus::{
    GenericMetricLayer, Handle, PrometheusMetricLayerBuilder,
    metrics_exporter_prometheus::PrometheusHandle,
};
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

pub mod audit;
pub mod client;
pub mod envfile;
pub mod errors;
pub mod lock;
pub mod probe;
pub mod proxy;
pub mod registry;
pub mod retry;
pub mod sse;
pub mod store;
pub mod swap;

use client::{BackendClient, HttpClient};
use proxy::proxy_handler;

/// Data-plane state: the pooled outbound client, the backend base URL, and
/// the process-level request counter. Nothing here is per-request; sessions
/// keep their own counters.
#[derive(Clone, Debug)]
pub struct AppState<T: HttpClient> {
    pub http_client: T,
    pub backend: Url,
    pub requests: Arc<AtomicU64>,
}

impl AppState<BackendClient> {
    /// Create an AppState with the default pooled backend client.
    pub fn new(backend: Url) -> Self {
        let http_client = BackendClient::new(
            Duration::from_secs(10),
            Duration::from_secs(300),
            100,
            Duration::from_secs(90),
        );
        Self {
            http_client,
            backend,
            requests: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T: HttpClient> AppState<T> {
    /// Create an AppState with a custom HTTP client (useful for testing).
    pub fn with_client(backend: Url, http_client: T) -> Self {
        Self {
            http_client,
            backend,
            requests: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Build the main router: every method and path forwards to the backend.
#[instrument(skip(state))]
pub fn build_router<T>(state: AppState<T>) -> Router
where
    T: HttpClient + Clone + Send + Sync + 'static,
{
    info!("Building router");
    Router::new()
        .route("/", any(proxy_handler::<T>))
        .route("/{*path}", any(proxy_handler::<T>))
        .with_state(state)
}

/// Builds a router for the metrics endpoint.
#[instrument(skip(handle))]
pub fn build_metrics_router(handle: PrometheusHandle) -> Router {
    info!("Building metrics router");
    Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    )
}

type MetricsLayerAndHandle = (
    GenericMetricLayer<'static, PrometheusHandle, Handle>,
    PrometheusHandle,
);

/// Builds a layer and handle for prometheus metrics collection.
pub fn build_metrics_layer_and_handle(
    prefix: impl Into<Cow<'static, str>>,
) -> MetricsLayerAndHandle {
    info!("Building metrics layer");
    PrometheusMetricLayerBuilder::new()
        .with_prefix(prefix)
        .enable_response_body_size(true)
        .with_endpoint_label_type(axum_prometheus::EndpointLabel::Exact)
        .with_default_metrics()
        .build_pair()
}
