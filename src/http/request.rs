//! Request identity middleware.
//!
//! # Responsibilities
//! - Stamp a unique request ID on every inbound call that lacks one
//! - Expose the ID for handlers, log lines, and the fetch logger callback
//!
//! # Design Decisions
//! - The ID is added as early as possible so it reaches every child fetch
//! - Caller-provided IDs are preserved; a fronting gateway usually owns them

use axum::http::{HeaderName, HeaderValue, Request};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use uuid::Uuid;

/// Correlation header forwarded verbatim to every child request.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Layer that stamps `X-Request-Id` on requests missing one.
#[derive(Clone, Copy, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for RequestIdService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        if !request.headers().contains_key(&X_REQUEST_ID) {
            let id = Uuid::new_v4().to_string();
            if let Ok(value) = HeaderValue::from_str(&id) {
                request.headers_mut().insert(X_REQUEST_ID, value);
            }
        }

        self.inner.call(request)
    }
}

/// Extension trait for reading the request ID off a request.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.headers()
            .get(&X_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_the_request_id() {
        let request = Request::builder()
            .uri("/aggregate")
            .header("x-request-id", "req-7")
            .body(())
            .unwrap();

        assert_eq!(request.request_id(), Some("req-7"));
    }

    #[test]
    fn missing_id_is_none() {
        let request = Request::builder().uri("/aggregate").body(()).unwrap();
        assert_eq!(request.request_id(), None);
    }
}
