//! HTTP client abstraction for forwarding requests to the backend
//!
//! This module provides a unified interface for making HTTP requests, allowing
//! different client implementations (hyper, mock clients for testing, etc.) to
//! be used interchangeably throughout the proxy.

use async_trait::async_trait;
use axum::response::IntoResponse;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;

/// How forwarding to the backend can fail. The proxy maps these onto
/// 502 / 504 / 500 for the client; they never crash the process.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("cannot connect to backend: {0}")]
    Unreachable(String),

    #[error("backend did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait HttpClient: std::fmt::Debug {
    async fn request(
        &self,
        req: axum::extract::Request,
    ) -> Result<axum::response::Response, UpstreamError>;
}

/// Pooled client for the local backend, plain HTTP with a connect timeout
/// on the connector and a total timeout around each request.
#[derive(Clone, Debug)]
pub struct BackendClient {
    inner: Client<HttpConnector, axum::body::Body>,
    total_timeout: Duration,
}

impl BackendClient {
    pub fn new(
        connect_timeout: Duration,
        total_timeout: Duration,
        pool_max_idle_per_host: usize,
        pool_idle_timeout: Duration,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));

        tracing::debug!(
            connect_timeout_secs = connect_timeout.as_secs(),
            total_timeout_secs = total_timeout.as_secs(),
            pool_max_idle_per_host,
            "building backend client"
        );

        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(pool_idle_timeout)
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .pool_timer(TokioTimer::new())
            .build(connector);

        Self {
            inner,
            total_timeout,
        }
    }
}

#[async_trait]
impl HttpClient for BackendClient {
    async fn request(
        &self,
        req: axum::extract::Request,
    ) -> Result<axum::response::Response, UpstreamError> {
        match tokio::time::timeout(self.total_timeout, self.inner.request(req)).await {
            Err(_) => Err(UpstreamError::Timeout(self.total_timeout)),
            Ok(Err(e)) if e.is_connect() => Err(UpstreamError::Unreachable(e.to_string())),
            Ok(Err(e)) => Err(UpstreamError::Other(e.to_string())),
            Ok(Ok(response)) => Ok(response.into_response()),
        }
    }
}
