//! Error model for the aggregation pipeline.
//!
//! Two kinds of failure exist: envelope-level ([`BuildError`]), which
//! short-circuits the whole call with an HTTP status, and per-child
//! ([`ChildError`]), which rides inside the merged 200 response. The
//! [`ErrorMap`] is the composite container handed from the fetch phase to the
//! merge phase.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric code reported for transport-class child failures.
pub const TRANSPORT_ERR_CODE: u32 = 10000;

/// Envelope-level failures detected before any fetch starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The request body did not decode as an aggregate envelope.
    #[error("Must provide aggregate query")]
    MissingQuery,

    /// The envelope carries more entries than the configured cap.
    #[error("Too many aggregate requests")]
    TooManyRequests,
}

/// A single child's failure.
///
/// Only `message` and `code` appear on the wire; the remaining fields give
/// the merge phase context for message wrapping and for the per-child
/// `meta.http_status` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildError {
    #[serde(skip)]
    pub path: String,

    #[serde(skip)]
    pub method: String,

    #[serde(default)]
    pub message: String,

    #[serde(rename = "code", default)]
    pub err_code: u32,

    #[serde(skip)]
    pub status_code: u16,

    #[serde(skip)]
    pub err_timeout: bool,
}

impl ChildError {
    /// Copy of this error with the message prefixed by its request context,
    /// e.g. `GET /users/42: Not Found`.
    pub fn wrapped(&self) -> ChildError {
        let mut err = self.clone();
        err.message = format!("{} {}: {}", self.method, self.path, self.message);
        err
    }
}

impl fmt::Display for ChildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ChildError {}

/// Per-child error container returned by the fetch phase alongside partial
/// successes. Never absent; empty means every child produced a response.
#[derive(Debug, Clone, Default)]
pub struct ErrorMap(HashMap<String, ChildError>);

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, err: ChildError) {
        self.0.insert(name.into(), err);
    }

    pub fn get(&self, name: &str) -> Option<&ChildError> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for ErrorMap {
    type Item = (String, ChildError);
    type IntoIter = std::collections::hash_map::IntoIter<String, ChildError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ErrorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.values().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join(","))
    }
}

impl std::error::Error for ErrorMap {}
