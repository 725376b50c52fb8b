//! Inbound envelope types.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// The single inbound JSON document enumerating sub-requests:
/// `{"aggregate": {<name>: <payload>, ...}}`.
#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub aggregate: HashMap<String, SubRequest>,
}

/// One named sub-request within the envelope. Every field is optional on the
/// wire; `path` defaults to the upstream root.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubRequest {
    pub method: String,

    pub path: String,

    /// Arbitrary JSON forwarded verbatim as the child request body.
    pub body: Option<Value>,

    /// Milliseconds; 0 means "use the configured default".
    pub timeout: u64,
}

impl SubRequest {
    pub fn method_or_default(&self) -> &str {
        if self.method.is_empty() {
            "GET"
        } else {
            &self.method
        }
    }

    /// Serialized request body, absent when the payload carries none.
    pub fn body_bytes(&self) -> Option<Vec<u8>> {
        self.body
            .as_ref()
            .map(|value| serde_json::to_vec(value).unwrap_or_default())
    }
}
