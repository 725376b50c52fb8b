//! Full-stack tests: real listener, real middleware, real upstream.

mod common;

use std::sync::Arc;
use std::time::Duration;

use aggregator_gateway::aggregate::{DefaultExecutor, ExecutorOptions};
use aggregator_gateway::config::GatewayConfig;
use aggregator_gateway::{HttpServer, Shutdown};
use serde_json::Value;

async fn start_gateway(base_url: &str) -> (String, Shutdown) {
    let mut config = GatewayConfig::default();
    config.upstream.base_url = base_url.to_string();
    config.aggregate.default_timeout_ms = 1_000;
    config.aggregate.max_timeout_ms = 2_000;

    let executor = DefaultExecutor::new(
        base_url,
        ExecutorOptions {
            default_timeout: Duration::from_millis(config.aggregate.default_timeout_ms),
            max_timeout: Duration::from_millis(config.aggregate.max_timeout_ms),
            ..ExecutorOptions::default()
        },
    )
    .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, Arc::new(executor));
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (format!("http://{}", addr), shutdown)
}

#[tokio::test]
async fn serves_aggregate_calls_end_to_end() {
    let upstream = common::start_upstream().await;
    let (gateway, shutdown) = start_gateway(&upstream).await;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let res = client
        .post(format!("{gateway}/aggregate"))
        .header("content-type", "application/json")
        .body(r#"{"aggregate":{"u":{"path":"/users/42"}}}"#)
        .send()
        .await
        .expect("gateway unreachable");

    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["u"]["name"], "X");
    assert_eq!(body["meta"]["u"]["http_status"], 200);

    shutdown.trigger();
}

#[tokio::test]
async fn malformed_envelopes_get_a_400_through_the_stack() {
    let upstream = common::start_upstream().await;
    let (gateway, shutdown) = start_gateway(&upstream).await;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let res = client
        .post(format!("{gateway}/aggregate"))
        .body("not json")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["errors"][0]["message"], "Must provide aggregate query");

    shutdown.trigger();
}

#[tokio::test]
async fn stamps_a_request_id_when_the_caller_sends_none() {
    let upstream = common::start_upstream().await;
    let (gateway, shutdown) = start_gateway(&upstream).await;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let res = client
        .post(format!("{gateway}/aggregate"))
        .body(r#"{"aggregate":{"h":{"path":"/header"}}}"#)
        .send()
        .await
        .unwrap();

    let body: Value = res.json().await.unwrap();
    let forwarded = body["data"]["h"]["x-request-id"].as_str().unwrap();
    assert!(!forwarded.is_empty(), "middleware should stamp an ID");

    shutdown.trigger();
}

#[tokio::test]
async fn health_probe_answers_200() {
    let upstream = common::start_upstream().await;
    let (gateway, shutdown) = start_gateway(&upstream).await;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let res = client.get(format!("{gateway}/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    let res = client.get(format!("{gateway}/nope")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    shutdown.trigger();
}
