//! Error types for the MCP server.
//!
//! Failures of the upstream Skyvern API are not represented here; they reach
//! the caller as data (see [`crate::envelope`]). This type covers protocol,
//! configuration and startup problems.

use thiserror::Error;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// MCP server errors.
#[derive(Error, Debug)]
pub enum Error {
    /// JSON-RPC protocol error.
    #[error("JSON-RPC error: {code} - {message}")]
    JsonRpc {
        /// Error code.
        code: i32,
        /// Error message.
        message: String,
        /// Additional data.
        data: Option<serde_json::Value>,
    },

    /// Tool not found.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Resource not found.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// Invalid parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// A request arrived before `initialize`.
    #[error("server not initialized")]
    NotInitialized,

    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The OpenAPI document could not be fetched.
    #[error("failed to fetch OpenAPI spec from '{location}': {message}")]
    SpecFetch {
        /// URL or path of the document.
        location: String,
        /// Underlying cause.
        message: String,
    },

    /// The OpenAPI document could not be parsed.
    #[error("failed to parse OpenAPI spec from '{location}': {message}")]
    SpecParse {
        /// URL or path of the document.
        location: String,
        /// Underlying cause.
        message: String,
    },

    /// HTTP client construction error.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::JsonRpc { code, .. } => *code,
            Error::ToolNotFound(_) => codes::METHOD_NOT_FOUND,
            Error::ResourceNotFound(_) => codes::RESOURCE_NOT_FOUND,
            Error::InvalidParams(_) => codes::INVALID_PARAMS,
            Error::NotInitialized => codes::INTERNAL_ERROR,
            Error::Config(_) => -32000,
            Error::SpecFetch { .. } | Error::SpecParse { .. } => -32001,
            Error::Http(_) => -32003,
            Error::Serialization(_) => codes::PARSE_ERROR,
            Error::Io(_) => -32004,
            Error::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Convert to JSON-RPC error response.
    pub fn to_json_rpc_error(&self) -> serde_json::Value {
        match self {
            Error::JsonRpc {
                data: Some(data), ..
            } => serde_json::json!({
                "code": self.code(),
                "message": self.to_string(),
                "data": data,
            }),
            _ => serde_json::json!({
                "code": self.code(),
                "message": self.to_string(),
            }),
        }
    }
}

/// Standard JSON-RPC error codes.
pub mod codes {
    /// Parse error.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Resource not found (MCP extension).
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
}
