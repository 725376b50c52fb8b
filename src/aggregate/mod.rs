//! Request aggregation pipeline.
//!
//! # Data Flow
//! ```text
//! POST /aggregate (envelope of named sub-requests)
//!     → builder.rs (decode envelope, derive child requests, clamp timeouts)
//!     → fetcher.rs (concurrent dispatch, one deadline per child)
//!     → finisher.rs (read bodies, classify, merge into one document)
//!     → single JSON response keyed by child name
//! ```
//!
//! # Design Decisions
//! - The `Executor` contract is a capability set; the aggregator depends on
//!   nothing else and callers may swap in their own pipeline.
//! - Failure of one child never suppresses another; only a malformed
//!   envelope short-circuits the call.
//! - Metrics and logging are injected callbacks, never global state.

pub mod builder;
pub mod envelope;
pub mod error;
pub mod fetcher;
pub mod finisher;

pub use builder::{format_duration, ChildRequest, RequestBuilder, X_INVALID, X_TIMEOUT};
pub use envelope::{Envelope, SubRequest};
pub use error::{BuildError, ChildError, ErrorMap, TRANSPORT_ERR_CODE};
pub use fetcher::{ChildResponse, FetchLatency, FetchLogger, Fetcher, X_ROUTE_PATTERN};
pub use finisher::Finisher;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::response::Response;

/// Upper bound on the inbound envelope size.
const MAX_ENVELOPE_BYTES: usize = 2 * 1024 * 1024;

/// Capability set the aggregator depends on: Build, Fetch, Finish and the
/// envelope-level failure path.
#[async_trait]
pub trait Executor: Send + Sync {
    fn build(
        &self,
        head: &Parts,
        body: &[u8],
    ) -> Result<HashMap<String, ChildRequest>, BuildError>;

    async fn fetch(
        &self,
        children: HashMap<String, ChildRequest>,
    ) -> (HashMap<String, ChildResponse>, ErrorMap);

    async fn finish(
        &self,
        responses: HashMap<String, ChildResponse>,
        errors: ErrorMap,
    ) -> Response;

    fn finish_err(&self, code: StatusCode, err: &BuildError) -> Response;
}

/// Options for [`DefaultExecutor`].
pub struct ExecutorOptions {
    /// Shared upstream connection pool. Defaults to a fresh client.
    pub client: Option<reqwest::Client>,

    /// Per-child timeout when the payload omits one.
    pub default_timeout: Duration,

    /// Upper clamp on any payload-specified timeout.
    pub max_timeout: Duration,

    /// Maximum number of aggregate entries; 0 means unlimited.
    pub max_request: usize,

    pub fetch_latency: Option<FetchLatency>,

    pub fetch_logger: Option<FetchLogger>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            client: None,
            default_timeout: Duration::from_secs(5),
            max_timeout: Duration::from_secs(10),
            max_request: 0,
            fetch_latency: None,
            fetch_logger: None,
        }
    }
}

/// The default Build/Fetch/Finish pipeline against one upstream base URL.
pub struct DefaultExecutor {
    builder: RequestBuilder,
    fetcher: Fetcher,
    finisher: Finisher,
}

impl DefaultExecutor {
    pub fn new(base_url: &str, options: ExecutorOptions) -> Result<Self, url::ParseError> {
        let builder = RequestBuilder::new(
            base_url,
            options.default_timeout,
            options.max_timeout,
            options.max_request,
        )?;

        let client = options.client.unwrap_or_default();
        let fetcher = Fetcher::new(client, options.fetch_latency, options.fetch_logger);

        Ok(Self { builder, fetcher, finisher: Finisher })
    }
}

#[async_trait]
impl Executor for DefaultExecutor {
    fn build(
        &self,
        head: &Parts,
        body: &[u8],
    ) -> Result<HashMap<String, ChildRequest>, BuildError> {
        self.builder.build(head, body)
    }

    async fn fetch(
        &self,
        children: HashMap<String, ChildRequest>,
    ) -> (HashMap<String, ChildResponse>, ErrorMap) {
        self.fetcher.fetch(children).await
    }

    async fn finish(
        &self,
        responses: HashMap<String, ChildResponse>,
        errors: ErrorMap,
    ) -> Response {
        self.finisher.finish(responses, errors).await
    }

    fn finish_err(&self, code: StatusCode, err: &BuildError) -> Response {
        self.finisher.finish_err(code, err)
    }
}

/// Top-level orchestrator: Build → Fetch → Finish.
pub struct Aggregator {
    executor: Arc<dyn Executor>,
}

impl Aggregator {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    /// Serve one aggregate call. Envelope-level failures answer with their
    /// own status; per-child failures ride inside the 200 body. No retries,
    /// no cross-child cancellation.
    pub async fn serve(&self, request: Request<Body>) -> Response {
        let (head, body) = request.into_parts();

        let body = match to_bytes(body, MAX_ENVELOPE_BYTES).await {
            Ok(bytes) => bytes,
            Err(_) => {
                return self
                    .executor
                    .finish_err(StatusCode::BAD_REQUEST, &BuildError::MissingQuery)
            }
        };

        let children = match self.executor.build(&head, &body) {
            Ok(children) => children,
            Err(err) => return self.executor.finish_err(StatusCode::BAD_REQUEST, &err),
        };

        let (responses, errors) = self.executor.fetch(children).await;
        self.executor.finish(responses, errors).await
    }
}
