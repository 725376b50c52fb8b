//! Shared mock upstream for integration tests.

use std::io::Write;

use axum::body::Bytes;
use axum::extract::{MatchedPath, Path, Request};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Spawn the mock upstream on an ephemeral port; returns its base URL.
///
/// Every response carries an `X-Route-Pattern` header with the matched
/// template route, the way a real fronted API would label it for metrics.
pub async fn start_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new()
        .route("/users/{id}", get(user))
        .route("/posts", post(create_post))
        .route("/message", get(message))
        .route("/422", get(unprocessable))
        .route("/timeout", get(slow))
        .route("/timeout-config", get(timeout_config))
        .route("/query", get(echo_query))
        .route("/text", get(plain_text))
        .route("/gzip", get(gzip_body))
        .route("/gzip-invalid", get(gzip_invalid))
        .route("/header", get(echo_request_id))
        .layer(middleware::from_fn(stamp_route_pattern));

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Backend that declares a Content-Length it never delivers, so body reads
/// fail downstream of a successful dispatch.
#[allow(dead_code)]
pub async fn start_truncated_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        let _ = socket
                            .write_all(
                                b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\npartial",
                            )
                            .await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    format!("http://{}", addr)
}

/// Base URL with nothing listening behind it.
#[allow(dead_code)]
pub async fn unreachable_base() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    format!("http://{}", addr)
}

async fn stamp_route_pattern(
    matched: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let pattern = matched
        .map(|path| path.as_str().to_owned())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&pattern) {
        response.headers_mut().insert("x-route-pattern", value);
    }
    response
}

async fn user(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "data": {"id": id, "name": "X"},
        "meta": {"http_status": 200},
    }))
}

async fn create_post(headers: HeaderMap, body: Bytes) -> Json<Value> {
    let body: Value = serde_json::from_slice(&body).unwrap_or_default();
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default();

    Json(json!({
        "data": {
            "agent": header_str(&headers, "user-agent"),
            "hello": format!("Hello {name}!"),
            "ip": header_str(&headers, "x-real-ip"),
        },
        "meta": {"http_status": 200},
    }))
}

async fn message() -> Json<Value> {
    Json(json!({
        "data": {},
        "message": "created",
        "meta": {"http_status": 200},
    }))
}

async fn unprocessable() -> impl IntoResponse {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "errors": [{"code": 1, "message": "bad"}],
            "meta": {"http_status": 422},
        })),
    )
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    Json(json!({"data": {}, "meta": {"http_status": 200}}))
}

async fn timeout_config(headers: HeaderMap) -> Json<Value> {
    Json(json!({
        "data": {"timeout": header_str(&headers, "x-timeout")},
        "meta": {"http_status": 200},
    }))
}

async fn echo_query(uri: Uri) -> Json<Value> {
    Json(json!({
        "data": {"url": uri.to_string()},
        "meta": {"http_status": 200},
    }))
}

async fn plain_text() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "hello!")
}

async fn gzip_body() -> impl IntoResponse {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(br#"{"data":{"hello":"gzip!"},"meta":{"http_status":200}}"#)
        .unwrap();
    let compressed = encoder.finish().unwrap();

    (
        [
            (header::CONTENT_ENCODING, "gzip"),
            (header::CONTENT_TYPE, "application/json"),
        ],
        compressed,
    )
}

async fn gzip_invalid() -> impl IntoResponse {
    (
        [
            (header::CONTENT_ENCODING, "gzip"),
            (header::CONTENT_TYPE, "application/json"),
        ],
        r#"{"data":{"hello":"gzip!"},"meta":{"http_status":200}}"#,
    )
}

async fn echo_request_id(headers: HeaderMap) -> Json<Value> {
    Json(json!({
        "data": {"x-request-id": header_str(&headers, "x-request-id")},
        "meta": {"http_status": 200},
    }))
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
