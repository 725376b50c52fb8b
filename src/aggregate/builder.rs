//! Child request derivation.
//!
//! # Responsibilities
//! - Decode the inbound envelope and enforce the entry cap
//! - Derive one upstream request per named sub-request
//! - Propagate outer headers, applying the `*-Original` rewrite
//! - Merge outer and payload query strings
//! - Clamp per-child timeouts and stamp the `X-Timeout` marker

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use axum::http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use url::Url;

use crate::aggregate::envelope::{Envelope, SubRequest};
use crate::aggregate::error::BuildError;

/// Marker header carrying the effective per-child deadline as a
/// human-readable duration string.
pub const X_TIMEOUT: HeaderName = HeaderName::from_static("x-timeout");

/// Marker header flagging a child that must not be dispatched; the fetch
/// phase answers it with a synthetic 404 instead.
pub const X_INVALID: HeaderName = HeaderName::from_static("x-invalid");

/// Synthetic upstream request derived from one envelope entry.
#[derive(Debug, Clone)]
pub struct ChildRequest {
    pub method: Method,

    /// Absolute upstream URL: base scheme+host, payload path, merged query.
    /// Meaningless when `invalid` is set.
    pub url: Url,

    /// Outer headers after the `*-Original` rewrite, plus the markers.
    pub headers: HeaderMap,

    /// Serialized JSON payload body, absent when the payload carries none.
    pub body: Option<Vec<u8>>,

    /// Effective deadline after defaulting and clamping.
    pub timeout: Duration,

    /// Invalid children never touch the network.
    pub invalid: bool,

    /// Requested path, kept for error context. Holds the raw payload string
    /// when it failed to parse at all.
    pub path: String,
}

/// Derives the map `name -> child request` from one inbound request.
pub struct RequestBuilder {
    base_url: Url,
    default_timeout: Duration,
    max_timeout: Duration,
    max_request: usize,
}

impl RequestBuilder {
    pub fn new(
        base_url: &str,
        default_timeout: Duration,
        max_timeout: Duration,
        max_request: usize,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            default_timeout,
            max_timeout,
            max_request,
        })
    }

    /// Decode `body` as an aggregate envelope and derive all child requests.
    pub fn build(
        &self,
        head: &Parts,
        body: &[u8],
    ) -> Result<HashMap<String, ChildRequest>, BuildError> {
        let envelope: Envelope =
            serde_json::from_slice(body).map_err(|_| BuildError::MissingQuery)?;

        if self.max_request > 0 && envelope.aggregate.len() > self.max_request {
            return Err(BuildError::TooManyRequests);
        }

        let mut children = HashMap::with_capacity(envelope.aggregate.len());

        for (name, payload) in envelope.aggregate {
            children.insert(name, self.derive(head, &payload));
        }

        Ok(children)
    }

    fn derive(&self, head: &Parts, payload: &SubRequest) -> ChildRequest {
        let timeout = self.effective_timeout(payload);

        // Framing headers describe the outer envelope, not the child body;
        // the client recomputes them per child.
        let mut headers = head.headers.clone();
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);
        headers.remove(TRANSFER_ENCODING);
        if let Ok(value) = HeaderValue::from_str(&format_duration(timeout)) {
            headers.insert(X_TIMEOUT, value);
        }

        let method = match Method::from_bytes(payload.method_or_default().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return self.invalid_child(Method::GET, headers, payload.path.clone(), timeout)
            }
        };

        let raw_path = if payload.path.is_empty() { "/" } else { payload.path.as_str() };

        // An unparseable sub-path keeps the raw string for error context.
        let uri: Uri = match raw_path.parse() {
            Ok(uri) => uri,
            Err(_) => return self.invalid_child(method, headers, payload.path.clone(), timeout),
        };

        // Callers may not redirect children to arbitrary hosts.
        if uri.host().is_some() {
            return self.invalid_child(method, headers, uri.path().to_string(), timeout);
        }

        let path = if uri.path().is_empty() { "/" } else { uri.path() };
        let url = self.child_url(path, head.uri.query(), uri.query());

        rewrite_original_headers(&mut headers);

        ChildRequest {
            method,
            url,
            headers,
            body: payload.body_bytes(),
            timeout,
            invalid: false,
            path: path.to_string(),
        }
    }

    /// Outer query first, payload query overlaid; the payload wins wholesale
    /// on key collision. Keys encode in sorted order.
    fn child_url(&self, path: &str, outer_query: Option<&str>, payload_query: Option<&str>) -> Url {
        let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();

        if let Some(q) = outer_query {
            for (key, value) in url::form_urlencoded::parse(q.as_bytes()) {
                query.entry(key.into_owned()).or_default().push(value.into_owned());
            }
        }

        if let Some(q) = payload_query {
            let mut overlay: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (key, value) in url::form_urlencoded::parse(q.as_bytes()) {
                overlay.entry(key.into_owned()).or_default().push(value.into_owned());
            }
            for (key, values) in overlay {
                query.insert(key, values);
            }
        }

        let mut url = self.base_url.clone();
        url.set_path(path);
        url.set_query(None);

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, values) in &query {
                for value in values {
                    pairs.append_pair(key, value);
                }
            }
        }

        url
    }

    fn invalid_child(
        &self,
        method: Method,
        mut headers: HeaderMap,
        path: String,
        timeout: Duration,
    ) -> ChildRequest {
        headers.insert(X_INVALID, HeaderValue::from_static("true"));

        ChildRequest {
            method,
            url: self.base_url.clone(),
            headers,
            body: None,
            timeout,
            invalid: true,
            path,
        }
    }

    fn effective_timeout(&self, payload: &SubRequest) -> Duration {
        if payload.timeout == 0 {
            return self.default_timeout;
        }

        Duration::from_millis(payload.timeout).min(self.max_timeout)
    }
}

/// Every `*-Original` header replaces its bare counterpart and is removed,
/// so a fronting gateway can hand the true upstream values through.
fn rewrite_original_headers(headers: &mut HeaderMap) {
    let originals: Vec<HeaderName> = headers
        .keys()
        .filter(|key| key.as_str().ends_with("-original"))
        .cloned()
        .collect();

    for key in originals {
        let Some(stripped) = key.as_str().strip_suffix("-original") else {
            continue;
        };
        let Ok(target) = HeaderName::from_bytes(stripped.as_bytes()) else {
            continue;
        };
        if let Some(value) = headers.remove(&key) {
            headers.insert(target, value);
        }
    }
}

/// Render a deadline the way it appears in `X-Timeout` and in timeout error
/// messages: `250ms`, `1s`, `1.5s`.
pub fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        format!("{}ms", duration.as_millis())
    } else if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}s", duration.as_secs_f64())
    }
}
