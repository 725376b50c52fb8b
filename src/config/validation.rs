//! Configuration validation logic.

use url::Url;

use crate::config::schema::GatewayConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a GatewayConfig for semantic correctness.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. The upstream base URL must be absolute with an http(s) host.
    match Url::parse(&config.upstream.base_url) {
        Ok(url) => {
            if url.host_str().is_none() {
                errors.push(ValidationError(format!(
                    "upstream.base_url '{}' has no host",
                    config.upstream.base_url
                )));
            }
            if url.scheme() != "http" && url.scheme() != "https" {
                errors.push(ValidationError(format!(
                    "upstream.base_url scheme '{}' is not http or https",
                    url.scheme()
                )));
            }
        }
        Err(err) => {
            errors.push(ValidationError(format!(
                "upstream.base_url '{}' does not parse: {}",
                config.upstream.base_url, err
            )));
        }
    }

    // 2. The clamp must not sit below the default it clamps.
    if config.aggregate.max_timeout_ms < config.aggregate.default_timeout_ms {
        errors.push(ValidationError(
            "aggregate.max_timeout_ms must be >= aggregate.default_timeout_ms".to_string(),
        ));
    }

    // 3. Sanity-check timeouts (basic check).
    if config.aggregate.default_timeout_ms == 0 {
        tracing::warn!("aggregate.default_timeout_ms is 0, children get no deadline");
    }
    if config.timeouts.request_secs * 1_000 < config.aggregate.max_timeout_ms {
        tracing::warn!(
            "timeouts.request_secs is below aggregate.max_timeout_ms, slow children will be cut off"
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
