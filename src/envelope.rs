//! Normalized failure envelope returned to tool callers.
//!
//! Every outbound Skyvern call ends in either the decoded response body or one
//! of the mappings below. Agents branch on the `error` discriminator:
//!
//! ```json
//! {"error": "SkyvernAPIError", "message": "...", "details": "<body>", "status_code": 500}
//! {"error": "NetworkError", "message": "...", "details": "<cause>"}
//! {"error": "InternalServerError", "message": "...", "details": "<cause>"}
//! ```

use serde_json::{json, Value};

/// Name used in envelope messages.
pub const API_NAME: &str = "Skyvern";

/// Discriminator values for the `error` field.
pub mod kinds {
    /// Upstream answered with a non-2xx status.
    pub const API_ERROR: &str = "SkyvernAPIError";
    /// Upstream could not be reached.
    pub const NETWORK_ERROR: &str = "NetworkError";
    /// Anything else.
    pub const INTERNAL_ERROR: &str = "InternalServerError";
}

/// A failed outbound call, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFailure {
    /// The service responded with a non-2xx status.
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body text.
        body: String,
    },
    /// Transport-level failure: connect, DNS, timeout, body read, or a
    /// request that could not be built.
    Network(String),
    /// A 2xx response whose body was not valid JSON.
    Decode(String),
    /// Anything that fits none of the above.
    Unclassified(String),
}

impl ApiFailure {
    /// Classify a `reqwest` error raised while sending or reading.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            ApiFailure::Decode(err.to_string())
        } else {
            ApiFailure::Network(err.to_string())
        }
    }

    /// The `error` discriminator this failure renders with.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiFailure::Status { .. } => kinds::API_ERROR,
            ApiFailure::Network(_) => kinds::NETWORK_ERROR,
            ApiFailure::Decode(_) | ApiFailure::Unclassified(_) => kinds::INTERNAL_ERROR,
        }
    }

    /// Render the envelope. `internal_message` is the operation-specific text
    /// used for `InternalServerError`.
    pub fn to_envelope(&self, internal_message: &str) -> Value {
        match self {
            ApiFailure::Status { status, body } => json!({
                "error": self.kind(),
                "message": format!("{API_NAME} API request failed with status {status}"),
                "details": body,
                "status_code": status,
            }),
            ApiFailure::Network(cause) => json!({
                "error": self.kind(),
                "message": format!("Failed to connect to {API_NAME} API or other network issue."),
                "details": cause,
            }),
            ApiFailure::Decode(cause) | ApiFailure::Unclassified(cause) => json!({
                "error": self.kind(),
                "message": internal_message,
                "details": cause,
            }),
        }
    }

    /// Emit the operator-facing diagnostic line for this failure.
    pub fn log(&self, operation: &str) {
        match self {
            ApiFailure::Status { status, body } => {
                tracing::warn!(operation, status, "{API_NAME} API returned error status: {body}");
            }
            ApiFailure::Network(cause) => {
                tracing::warn!(operation, "{API_NAME} API request error: {cause}");
            }
            ApiFailure::Decode(cause) | ApiFailure::Unclassified(cause) => {
                tracing::error!(operation, "Unexpected error during {API_NAME} API call: {cause}");
            }
        }
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiFailure::Status { status, body } => write!(f, "status {status}: {body}"),
            ApiFailure::Network(cause) => write!(f, "network: {cause}"),
            ApiFailure::Decode(cause) => write!(f, "decode: {cause}"),
            ApiFailure::Unclassified(cause) => write!(f, "unclassified: {cause}"),
        }
    }
}

/// Returns `true` when `value` is a failure envelope produced by this module.
pub fn is_failure(value: &Value) -> bool {
    matches!(
        value.get("error").and_then(Value::as_str),
        Some(kinds::API_ERROR | kinds::NETWORK_ERROR | kinds::INTERNAL_ERROR)
    ) && value.get("message").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_envelope_shape() {
        let failure = ApiFailure::Status {
            status: 500,
            body: "oops".into(),
        };
        assert_eq!(
            failure.to_envelope("unused"),
            json!({
                "error": "SkyvernAPIError",
                "message": "Skyvern API request failed with status 500",
                "details": "oops",
                "status_code": 500,
            })
        );
    }

    #[test]
    fn network_envelope_has_no_status_code() {
        let envelope = ApiFailure::Network("connection refused".into()).to_envelope("unused");
        assert_eq!(envelope["error"], "NetworkError");
        assert_eq!(
            envelope["message"],
            "Failed to connect to Skyvern API or other network issue."
        );
        assert_eq!(envelope["details"], "connection refused");
        assert!(envelope.get("status_code").is_none());
    }

    #[test]
    fn decode_and_fallback_share_internal_shape() {
        for failure in [
            ApiFailure::Decode("expected value".into()),
            ApiFailure::Unclassified("weird".into()),
        ] {
            let envelope = failure.to_envelope("while doing the thing");
            assert_eq!(envelope["error"], "InternalServerError");
            assert_eq!(envelope["message"], "while doing the thing");
            assert!(is_failure(&envelope));
        }
    }

    #[test]
    fn plain_bodies_are_not_failures() {
        assert!(!is_failure(&json!({"run_id": "tsk_1", "status": "queued"})));
        assert!(!is_failure(&json!({"error": "something the API said"})));
    }
}
