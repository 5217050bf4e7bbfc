//! The data plane: forwards any request to the backend and re-frames
//! event-stream responses on the way back.

use crate::AppState;
use crate::client::{HttpClient, UpstreamError};
use crate::sse::SseReframedStream;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, instrument, warn};

/// Forwards one request to the backend, preserving method, path, query,
/// and body. Framing headers are re-derived rather than copied: `host`
/// and `content-length` are dropped on the way in, `transfer-encoding`
/// and `content-length` on the way out.
#[instrument(skip(state, req), fields(method = %req.method(), path = %req.uri().path()))]
pub async fn proxy_handler<T: HttpClient>(
    State(state): State<AppState<T>>,
    mut req: axum::extract::Request,
) -> Result<Response, StatusCode> {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|v| v.as_str())
        .unwrap_or(req.uri().path());
    let upstream_url = state
        .backend
        .join(path_and_query.strip_prefix('/').unwrap_or(path_and_query))
        .map_err(|_| StatusCode::BAD_REQUEST)?
        .to_string();
    let upstream_uri = match Uri::try_from(upstream_url.as_str()) {
        Ok(uri) => uri,
        Err(_) => {
            error!("Invalid upstream URI: {}", upstream_url);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    req.headers_mut().remove(header::HOST);
    req.headers_mut().remove(header::CONTENT_LENGTH);
    if let Some(host) = upstream_uri.host() {
        let host_value = if let Some(port) = upstream_uri.port_u16() {
            format!("{host}:{port}")
        } else {
            host.to_string()
        };
        if let Ok(value) = host_value.parse() {
            req.headers_mut().insert(header::HOST, value);
        }
    }
    *req.uri_mut() = upstream_uri;

    let request_no = state.requests.fetch_add(1, Ordering::Relaxed) + 1;
    debug!(request_no, "forwarding to {}", upstream_url);

    match state.http_client.request(req).await {
        Ok(response) => Ok(relay_response(response)),
        Err(e) => {
            warn!("upstream error for {}: {}", upstream_url, e);
            Ok(upstream_error_response(e))
        }
    }
}

/// Copies the backend response through, piping the body through the
/// reframer when it declares an event stream.
fn relay_response(response: Response) -> Response {
    let is_event_stream = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"));

    let (mut parts, body) = response.into_parts();
    parts.headers.remove(header::TRANSFER_ENCODING);
    parts.headers.remove(header::CONTENT_LENGTH);

    if is_event_stream {
        let reframed = SseReframedStream::new(body.into_data_stream());
        info!("event stream started");
        Response::from_parts(parts, Body::from_stream(reframed))
    } else {
        Response::from_parts(parts, body)
    }
}

/// 502 when the backend is unreachable, 504 when it timed out, 500 for
/// anything else. Per-request failures never take the proxy down.
fn upstream_error_response(e: UpstreamError) -> Response {
    let status = match e {
        UpstreamError::Unreachable(_) => StatusCode::BAD_GATEWAY,
        UpstreamError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        UpstreamError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, format!("Proxy Error: {e}")).into_response()
}
