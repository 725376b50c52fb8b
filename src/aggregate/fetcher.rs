//! Concurrent child dispatch.
//!
//! One task per child, joined before returning; a failing sibling never
//! aborts the rest. Transport failures are classified here, body handling
//! belongs to the finisher.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::header::CONTENT_ENCODING;
use axum::http::{HeaderName, Method, StatusCode};
use tokio::task::JoinSet;

use crate::aggregate::builder::{format_duration, ChildRequest};
use crate::aggregate::error::{ChildError, ErrorMap, TRANSPORT_ERR_CODE};
use crate::http::request::X_REQUEST_ID;

/// Upstream header labeling the matched template route, reported to the
/// latency callback.
pub const X_ROUTE_PATTERN: HeaderName = HeaderName::from_static("x-route-pattern");

/// Side-effect sink for per-fetch latency observations:
/// `(duration, method, route_pattern, status)`.
pub type FetchLatency = Arc<dyn Fn(Duration, &Method, &str, u16) + Send + Sync>;

/// Side-effect sink for per-fetch log lines:
/// `(duration, method, path, status, request_id)`.
pub type FetchLogger = Arc<dyn Fn(Duration, &Method, &str, u16, &str) + Send + Sync>;

/// A child's upstream reply with the body still unread, or a locally
/// synthesized response for children that were never dispatched.
#[derive(Debug)]
pub enum ChildResponse {
    Upstream {
        response: reqwest::Response,
        method: Method,
        path: String,
    },
    Local {
        status: StatusCode,
        body: Bytes,
        method: Method,
        path: String,
    },
}

impl ChildResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            ChildResponse::Upstream { response, .. } => response.status(),
            ChildResponse::Local { status, .. } => *status,
        }
    }

    pub fn method(&self) -> &Method {
        match self {
            ChildResponse::Upstream { method, .. } | ChildResponse::Local { method, .. } => method,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ChildResponse::Upstream { path, .. } | ChildResponse::Local { path, .. } => path,
        }
    }

    pub fn content_encoding(&self) -> Option<String> {
        match self {
            ChildResponse::Upstream { response, .. } => response
                .headers()
                .get(CONTENT_ENCODING)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
            ChildResponse::Local { .. } => None,
        }
    }

    pub fn route_pattern(&self) -> String {
        match self {
            ChildResponse::Upstream { response, .. } => response
                .headers()
                .get(&X_ROUTE_PATTERN)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            ChildResponse::Local { .. } => String::new(),
        }
    }

    /// Consume the response and read its raw body. Upstream read failures
    /// surface as a `ChildError` carrying the upstream status code.
    pub async fn into_bytes(self) -> Result<Bytes, ChildError> {
        match self {
            ChildResponse::Local { body, .. } => Ok(body),
            ChildResponse::Upstream { response, method, path } => {
                let status = response.status();
                response.bytes().await.map_err(|err| ChildError {
                    path,
                    method: method.to_string(),
                    message: innermost_message(&err),
                    err_code: TRANSPORT_ERR_CODE,
                    status_code: status.as_u16(),
                    err_timeout: false,
                })
            }
        }
    }
}

/// Executes the child requests of one envelope concurrently against a shared
/// connection pool.
pub struct Fetcher {
    client: reqwest::Client,
    fetch_latency: Option<FetchLatency>,
    fetch_logger: Option<FetchLogger>,
}

impl Fetcher {
    pub fn new(
        client: reqwest::Client,
        fetch_latency: Option<FetchLatency>,
        fetch_logger: Option<FetchLogger>,
    ) -> Self {
        Self { client, fetch_latency, fetch_logger }
    }

    /// Dispatch every child and join all tasks. Responses and per-child
    /// errors come back together; neither is fatal on its own.
    pub async fn fetch(
        &self,
        children: HashMap<String, ChildRequest>,
    ) -> (HashMap<String, ChildResponse>, ErrorMap) {
        let results = Arc::new(Mutex::new((HashMap::new(), ErrorMap::new())));
        let mut tasks = JoinSet::new();

        for (name, child) in children {
            let client = self.client.clone();
            let fetch_latency = self.fetch_latency.clone();
            let fetch_logger = self.fetch_logger.clone();
            let results = Arc::clone(&results);

            tasks.spawn(async move {
                let started = Instant::now();
                let outcome = dispatch(&client, &child).await;
                let elapsed = started.elapsed();

                report(&fetch_latency, &fetch_logger, &child, elapsed, &outcome);

                let mut guard = results.lock().expect("fetch results mutex poisoned");
                match outcome {
                    Ok(response) => {
                        guard.0.insert(name, response);
                    }
                    Err(err) => {
                        guard.1.insert(name, err);
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}

        let mut guard = results.lock().expect("fetch results mutex poisoned");
        let (responses, errors) = &mut *guard;
        (std::mem::take(responses), std::mem::take(errors))
    }
}

async fn dispatch(
    client: &reqwest::Client,
    child: &ChildRequest,
) -> Result<ChildResponse, ChildError> {
    if child.invalid {
        return Ok(local_not_found(child));
    }

    let mut request = client
        .request(child.method.clone(), child.url.clone())
        .headers(child.headers.clone());

    // A zero deadline means "no deadline".
    if !child.timeout.is_zero() {
        request = request.timeout(child.timeout);
    }

    if let Some(body) = &child.body {
        request = request.body(body.clone());
    }

    match request.send().await {
        Ok(response) => Ok(ChildResponse::Upstream {
            response,
            method: child.method.clone(),
            path: child.path.clone(),
        }),
        Err(err) => Err(classify(child, &err)),
    }
}

/// Invalid children skip the network and answer with a synthetic 404 whose
/// body is the bare error message text.
fn local_not_found(child: &ChildRequest) -> ChildResponse {
    ChildResponse::Local {
        status: StatusCode::NOT_FOUND,
        body: Bytes::from_static(b"Not Found"),
        method: child.method.clone(),
        path: child.path.clone(),
    }
}

fn classify(child: &ChildRequest, err: &reqwest::Error) -> ChildError {
    let (message, err_timeout) = if err.is_timeout() {
        (format!("timeout of {} exceeded", format_duration(child.timeout)), true)
    } else if err.is_connect() {
        (innermost_message(err), false)
    } else {
        (err.to_string(), false)
    };

    ChildError {
        path: child.path.clone(),
        method: child.method.to_string(),
        message,
        err_code: TRANSPORT_ERR_CODE,
        status_code: StatusCode::BAD_GATEWAY.as_u16(),
        err_timeout,
    }
}

/// The connection-level reason, stripped of reqwest's URL-bearing wrappers.
pub(crate) fn innermost_message(err: &dyn std::error::Error) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

fn report(
    fetch_latency: &Option<FetchLatency>,
    fetch_logger: &Option<FetchLogger>,
    child: &ChildRequest,
    elapsed: Duration,
    outcome: &Result<ChildResponse, ChildError>,
) {
    let status = match outcome {
        Ok(response) => response.status().as_u16(),
        Err(_) => StatusCode::BAD_GATEWAY.as_u16(),
    };

    if let Some(hook) = fetch_latency.as_deref() {
        let route_pattern = match outcome {
            Ok(response) => response.route_pattern(),
            Err(_) => String::new(),
        };
        hook(elapsed, &child.method, &route_pattern, status);
    }

    if let Some(hook) = fetch_logger.as_deref() {
        let request_id = child
            .headers
            .get(&X_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        hook(elapsed, &child.method, &child.path, status, request_id);
    }
}
