//! Response merging.
//!
//! Reads every child body, classifies it, and assembles the single merged
//! envelope. The whole document is built in memory before anything is
//! written, so the client never sees a partial body.

use std::collections::HashMap;
use std::io::Read;

use axum::body::Bytes;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use flate2::read::GzDecoder;
use serde::Serialize;
use serde_json::{json, Value};

use crate::aggregate::error::{BuildError, ChildError, ErrorMap, TRANSPORT_ERR_CODE};
use crate::aggregate::fetcher::ChildResponse;

/// Merges child responses and per-child errors into one 200 response.
pub struct Finisher;

impl Finisher {
    /// Normal path: always answers 200 with the merged document; per-child
    /// failures ride inside it.
    pub async fn finish(
        &self,
        responses: HashMap<String, ChildResponse>,
        fetch_errors: ErrorMap,
    ) -> Response {
        let (nodes, merge_errors) = self.before_finish(responses).await;

        let mut merged = MergedResponse::default();

        for (name, err) in fetch_errors {
            merged.add_error(name, err.wrapped());
        }
        for (name, err) in merge_errors {
            merged.add_error(name, err.wrapped());
        }
        for (name, node) in nodes {
            merged.add(name, &node);
        }

        let body = serde_json::to_vec(&merged).unwrap_or_default();
        ([(header::CONTENT_TYPE, "application/json")], body).into_response()
    }

    /// Envelope-level failure before any fetch: writes the given status and
    /// a bare error document.
    pub fn finish_err(&self, code: StatusCode, err: &BuildError) -> Response {
        let body = json!({
            "errors": [{"message": err.to_string()}],
            "meta": {"http_status": code.as_u16()},
        });

        (code, [(header::CONTENT_TYPE, "application/json")], body.to_string()).into_response()
    }

    /// Read and classify every child body. First match wins: an upstream
    /// error envelope is merged verbatim, then non-2xx statuses, then
    /// non-JSON bodies; everything else lands in the success pile.
    async fn before_finish(
        &self,
        responses: HashMap<String, ChildResponse>,
    ) -> (HashMap<String, Value>, ErrorMap) {
        let mut nodes = HashMap::new();
        let mut errors = ErrorMap::new();

        for (name, response) in responses {
            let status = response.status();
            let method = response.method().to_string();
            let path = response.path().to_string();
            let encoding = response.content_encoding();

            let raw = match response.into_bytes().await {
                Ok(raw) => raw,
                Err(err) => {
                    errors.insert(name, err);
                    continue;
                }
            };

            let body = match decode_body(raw, encoding.as_deref()) {
                Ok(body) => body,
                Err(message) => {
                    errors.insert(
                        name,
                        body_error(&method, &path, message, StatusCode::INTERNAL_SERVER_ERROR),
                    );
                    continue;
                }
            };

            match serde_json::from_slice::<Value>(&body) {
                Ok(node) if has_error_body(&node) => {
                    nodes.insert(name, node);
                }
                Ok(_) | Err(_) if !status.is_success() => {
                    errors.insert(name, body_error(&method, &path, status_text(status), status));
                }
                Ok(node) => {
                    nodes.insert(name, node);
                }
                Err(_) => {
                    errors.insert(
                        name,
                        body_error(
                            &method,
                            &path,
                            status_text(StatusCode::UNSUPPORTED_MEDIA_TYPE),
                            StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        ),
                    );
                }
            }
        }

        (nodes, errors)
    }
}

/// Decompress per `Content-Encoding`. A body that does not match its
/// declared encoding is a per-child failure, not a crash.
fn decode_body(raw: Bytes, encoding: Option<&str>) -> Result<Bytes, String> {
    match encoding {
        Some("gzip") => {
            let mut decoded = Vec::new();
            GzDecoder::new(raw.as_ref())
                .read_to_end(&mut decoded)
                .map_err(|err| err.to_string())?;
            Ok(Bytes::from(decoded))
        }
        _ => Ok(raw),
    }
}

/// A body with a non-empty `errors` array is a valid upstream error
/// envelope and is merged verbatim, whatever the status code says.
fn has_error_body(node: &Value) -> bool {
    node.get("errors")
        .and_then(Value::as_array)
        .is_some_and(|errs| !errs.is_empty())
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_owned)
        .unwrap_or_else(|| status.as_u16().to_string())
}

fn body_error(method: &str, path: &str, message: String, status: StatusCode) -> ChildError {
    ChildError {
        path: path.to_string(),
        method: method.to_string(),
        message,
        err_code: TRANSPORT_ERR_CODE,
        status_code: status.as_u16(),
        err_timeout: false,
    }
}

/// The merged envelope: four parallel maps keyed by child name. Every input
/// name appears in `data` or `error`; `message` is omitted when empty.
#[derive(Debug, Default, Serialize)]
pub struct MergedResponse {
    data: HashMap<String, Value>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    message: HashMap<String, String>,

    meta: HashMap<String, Value>,

    error: HashMap<String, Vec<ChildError>>,
}

impl MergedResponse {
    /// Merge one successful child body. The four sections are independent;
    /// absence of one never blocks the others.
    fn add(&mut self, name: String, node: &Value) {
        if let Some(data) = node.get("data") {
            self.data.insert(name.clone(), data.clone());
        }

        if let Some(message) = node.get("message").and_then(Value::as_str) {
            if !message.is_empty() {
                self.message.insert(name.clone(), message.to_string());
            }
        }

        if let Some(meta) = node.get("meta").filter(|meta| meta.is_object()) {
            self.meta.insert(name.clone(), meta.clone());
        }

        if let Some(errs) = node.get("errors") {
            if let Ok(errs) = serde_json::from_value::<Vec<ChildError>>(errs.clone()) {
                self.error.entry(name).or_default().extend(errs);
            }
        }
    }

    fn add_error(&mut self, name: String, err: ChildError) {
        self.meta
            .insert(name.clone(), json!({"http_status": err.status_code}));
        self.error.entry(name).or_default().push(err);
    }
}
