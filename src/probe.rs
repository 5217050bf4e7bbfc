//! Readiness probing against the backend's model-listing endpoint.
//!
//! A probe is a polled health signal, not a hard dependency: an unreachable
//! backend or a malformed listing yields `reachable = false` with an error
//! string, never an `Err` to the caller.

use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use serde_json::Value;
use std::time::Duration;

pub const MODELS_PATH: &str = "/v1/models";

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// What one probe observed.
#[derive(Debug, Clone, Default)]
pub struct BackendStatus {
    pub reachable: bool,
    pub models: Vec<String>,
    pub error: Option<String>,
}

impl BackendStatus {
    pub fn has_model(&self, name: &str) -> bool {
        self.reachable && self.models.iter().any(|m| m == name)
    }
}

/// Seam between the orchestrator and the backend, so tests can substitute
/// a scripted backend.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn fetch_models(&self) -> BackendStatus;
}

/// Probes the local backend over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    port: u16,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    async fn try_fetch(&self) -> Result<Vec<String>, String> {
        let client: hyper_util::client::legacy::Client<_, Empty<bytes::Bytes>> =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build_http();

        let uri: hyper::Uri = format!("http://localhost:{}{}", self.port, MODELS_PATH)
            .parse()
            .map_err(|e| format!("invalid probe URL: {e}"))?;

        let request = hyper::Request::builder()
            .method("GET")
            .uri(uri)
            .body(Empty::new())
            .map_err(|e| format!("failed to build probe request: {e}"))?;

        let response = tokio::time::timeout(self.timeout, client.request(request))
            .await
            .map_err(|_| "probe timeout".to_string())?
            .map_err(|e| format!("probe request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("backend returned {}", response.status()));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| format!("failed to read model listing: {e}"))?
            .to_bytes();

        let raw: Value =
            serde_json::from_slice(&body).map_err(|e| format!("invalid model listing: {e}"))?;

        Ok(raw
            .get("data")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|m| m.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn fetch_models(&self) -> BackendStatus {
        match self.try_fetch().await {
            Ok(models) => BackendStatus {
                reachable: true,
                models,
                error: None,
            },
            Err(error) => BackendStatus {
                reachable: false,
                models: Vec::new(),
                error: Some(error),
            },
        }
    }
}
