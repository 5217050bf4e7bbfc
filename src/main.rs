mod config;

use clap::Parser as _;
use config::Config;
use modelgate::client::BackendClient;
use modelgate::{AppState, build_metrics_layer_and_handle, build_metrics_router, build_router};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Config::parse().resolve().await?;

    let http_client = BackendClient::new(
        settings.connect_timeout,
        settings.request_timeout,
        settings.pool_max_idle_per_host,
        settings.pool_idle_timeout,
    );
    let state = AppState::with_client(settings.backend.clone(), http_client);
    let mut app = build_router(state);

    if settings.metrics {
        let (prometheus_layer, metrics_handle) =
            build_metrics_layer_and_handle(settings.metrics_prefix.clone());
        app = app.layer(prometheus_layer);

        let metrics_app = build_metrics_router(metrics_handle);
        let metrics_listener =
            tokio::net::TcpListener::bind(format!("0.0.0.0:{}", settings.metrics_port)).await?;
        info!("Metrics server listening on {}", settings.metrics_port);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, metrics_app).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;
    info!(
        "Proxying requests on port {} to {}",
        settings.port, settings.backend
    );
    axum::serve(listener, app).await?;

    Ok(())
}
