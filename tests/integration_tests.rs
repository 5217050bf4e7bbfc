//! End-to-end tests over real sockets: a fake backend served by axum, the
//! pooled client in front of it, and the full router in between.

use axum::Router;
use axum::body::Body;
use axum::response::IntoResponse;
use axum::routing::get;
use axum_test::TestServer;
use futures_util::StreamExt;
use futures_util::stream;
use modelgate::client::BackendClient;
use modelgate::probe::HttpProbe;
use modelgate::swap::{SwapPaths, SwapService, SwitchOptions, SwitchOutcome};
use modelgate::{AppState, build_router};
use serde_json::{Value, json};
use std::time::Duration;

async fn spawn_backend(app: Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

fn proxy_for(port: u16, client: BackendClient) -> TestServer {
    let backend = format!("http://localhost:{port}").parse().unwrap();
    let state = AppState::with_client(backend, client);
    TestServer::new(build_router(state)).unwrap()
}

fn default_client() -> BackendClient {
    BackendClient::new(
        Duration::from_secs(1),
        Duration::from_secs(5),
        4,
        Duration::from_secs(30),
    )
}

#[tokio::test]
async fn test_forwards_method_path_and_query() {
    let backend = Router::new().route(
        "/echo",
        get(|uri: axum::http::Uri| async move { uri.to_string() }),
    );
    let port = spawn_backend(backend).await;
    let server = proxy_for(port, default_client());

    let response = server.get("/echo?a=1&b=2").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.text(), "/echo?a=1&b=2");
}

#[tokio::test]
async fn test_event_stream_reframed_over_the_wire() {
    async fn completion() -> impl IntoResponse {
        // Frames split mid-line across write boundaries, one frame carrying
        // a delta field downstream must not see.
        let chunks: Vec<&[u8]> = vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"He\",\"reasoning_content\":\"x\"}}]}\n\nda",
            b"ta: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\ndata: [DONE]\n\n",
        ];
        let stream = stream::iter(chunks).then(|chunk| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, std::io::Error>(chunk.to_vec())
        });

        axum::http::Response::builder()
            .header("content-type", "text/event-stream")
            .header("cache-control", "no-cache")
            .body(Body::from_stream(stream))
            .unwrap()
    }

    let backend = Router::new().route(
        "/v1/chat/completions",
        axum::routing::post(completion),
    );
    let port = spawn_backend(backend).await;
    let server = proxy_for(port, default_client());

    let response = server
        .post("/v1/chat/completions")
        .json(&json!({"model": "a", "stream": true}))
        .await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let text = response.text();
    assert!(text.ends_with("data: [DONE]\n\n"), "got: {text}");

    let frames: Vec<Value> = text
        .lines()
        .filter(|l| l.starts_with("data: ") && !l.contains("[DONE]"))
        .map(|l| serde_json::from_str(&l["data: ".len()..]).unwrap())
        .collect();
    assert_eq!(frames.len(), 2, "both split frames must survive: {text}");

    let ids: Vec<&str> = frames.iter().map(|f| f["id"].as_str().unwrap()).collect();
    assert!(ids[0].starts_with("chatcmpl-"));
    assert_eq!(ids[0], ids[1]);

    assert_eq!(frames[0]["choices"][0]["delta"]["content"], "He");
    assert!(
        frames[0]["choices"][0]["delta"]
            .get("reasoning_content")
            .is_none()
    );
}

#[tokio::test]
async fn test_backend_down_yields_502() {
    // Bind and immediately drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let server = proxy_for(port, default_client());
    let response = server.get("/v1/models").await;

    assert_eq!(response.status_code(), 502);
    assert!(response.text().starts_with("Proxy Error:"));
}

#[tokio::test]
async fn test_slow_backend_yields_504() {
    let backend = Router::new().route(
        "/v1/chat/completions",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            "too late"
        }),
    );
    let port = spawn_backend(backend).await;

    let client = BackendClient::new(
        Duration::from_secs(1),
        Duration::from_millis(200),
        4,
        Duration::from_secs(30),
    );
    let server = proxy_for(port, client);

    let response = server.get("/v1/chat/completions").await;
    assert_eq!(response.status_code(), 504);
}

#[tokio::test]
async fn test_switch_waits_on_a_live_backend() {
    let backend = Router::new().route(
        "/v1/models",
        get(|| async { axum::Json(json!({"data": [{"id": "b"}]})) }),
    );
    let port = spawn_backend(backend).await;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir(root.join("run")).unwrap();
    std::fs::create_dir(root.join("models-a")).unwrap();
    std::fs::create_dir(root.join("models-b")).unwrap();

    let path_a = root.join("models-a").display().to_string();
    let path_b = root.join("models-b").display().to_string();

    std::fs::write(
        root.join("config.json"),
        serde_json::to_string_pretty(&json!({
            "model_config_list": [{"config": {"name": "a", "base_path": path_a}}]
        }))
        .unwrap(),
    )
    .unwrap();
    std::fs::write(
        root.join("run/models_registry.json"),
        serde_json::to_string(&json!({"models": {"b": path_b}})).unwrap(),
    )
    .unwrap();
    std::fs::write(
        root.join("config.env"),
        format!("BACKEND_PORT={port}\nMODEL_NAME=a\nMODEL_PATH={path_a}\n"),
    )
    .unwrap();

    let service = SwapService::new(SwapPaths::new(root), HttpProbe::new(port), port)
        .with_intervals(Duration::from_millis(50), Duration::from_secs(2));

    let outcome = service.switch("b", SwitchOptions::default()).await.unwrap();
    assert!(
        matches!(outcome, SwitchOutcome::Ready { .. }),
        "got: {outcome:?}"
    );

    let status = service.status().await.unwrap();
    assert_eq!(status.configured_model, "b");
    assert_eq!(status.configured_path, path_b);
    assert!(status.backend_reachable);
    assert!(status.backend_models.contains(&"b".to_string()));
}
