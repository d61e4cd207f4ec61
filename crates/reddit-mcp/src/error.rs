//! Error types for the gateway.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.
//! OAuth endpoints surface `{error, error_description}` JSON bodies; the MCP endpoint
//! surfaces JSON-RPC errors. Secret material never appears in any error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Errors from the upstream HTTP client layer.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// Upstream endpoint returned a non-2xx status
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        /// HTTP status code from the upstream
        status: u16,
        /// Response body or message
        message: String,
    },

    /// Rate limited by the upstream (429 response)
    #[error("Rate limited by upstream")]
    RateLimited,

    /// JSON parsing error
    #[error("Failed to parse upstream response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ClientError {
    /// Create an upstream error from a status and body.
    #[must_use]
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream { status, message: message.into() }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Upstream { status: 500..=599, .. })
    }
}

/// Canonical OAuth 2.0 errors surfaced by the authorization server.
///
/// Each variant maps to a canonical `error` code and an HTTP status; the
/// description is safe to return to callers (no secret material).
#[derive(thiserror::Error, Debug)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("only response_type=code is supported")]
    UnsupportedResponseType,

    #[error("unsupported grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("{0}")]
    InvalidGrant(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("the resource owner denied the request")]
    AccessDenied,

    #[error("{0}")]
    UpstreamError(String),

    #[error("{0}")]
    ServerError(String),
}

impl OAuthError {
    /// The canonical OAuth `error` code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidToken(_) => "invalid_token",
            Self::AccessDenied => "access_denied",
            Self::UpstreamError(_) => "upstream_error",
            Self::ServerError(_) => "server_error",
        }
    }

    /// HTTP status for this error at an OAuth endpoint.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            Self::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Create an `invalid_request` error.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest(description.into())
    }

    /// Create an `invalid_grant` error.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant(description.into())
    }
}

impl From<ClientError> for OAuthError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Upstream { status, .. } => {
                Self::UpstreamError(format!("upstream returned status {status}"))
            }
            ClientError::RateLimited => Self::UpstreamError("upstream rate limited".into()),
            // Transport and parse failures: the logged cause stays internal.
            _ => Self::UpstreamError("upstream request failed".into()),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.error_code(),
            "error_description": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// JSON-RPC error codes used on the MCP endpoint.
pub mod rpc_code {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const AUTHENTICATION_REQUIRED: i32 = -32001;
    pub const SESSION_NOT_FOUND: i32 = -32002;
    pub const DEADLINE_EXCEEDED: i32 = -32003;
    pub const TRANSPORT_CLOSED: i32 = -32004;
    pub const UPSTREAM_ERROR: i32 = -32010;
}

/// Errors surfaced as JSON-RPC errors on the MCP endpoint.
#[derive(thiserror::Error, Debug, Clone)]
pub enum McpError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Schema validation failed; `paths` names each offending field path.
    #[error("invalid_arguments: {}", paths.join(", "))]
    InvalidArguments { paths: Vec<String> },

    #[error("not_found: {0}")]
    NotFound(String),

    #[error("authentication_required: no upstream credentials bound to this session")]
    AuthenticationRequired,

    #[error("session_not_found: {0}")]
    SessionNotFound(String),

    #[error("deadline_exceeded")]
    DeadlineExceeded,

    #[error("transport_closed")]
    TransportClosed,

    #[error("upstream_error: {0}")]
    UpstreamError(String),

    #[error("Internal error")]
    Internal,
}

impl McpError {
    /// The JSON-RPC error code for this variant.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::MethodNotFound(_) => rpc_code::METHOD_NOT_FOUND,
            Self::InvalidArguments { .. } | Self::NotFound(_) => rpc_code::INVALID_PARAMS,
            Self::AuthenticationRequired => rpc_code::AUTHENTICATION_REQUIRED,
            Self::SessionNotFound(_) => rpc_code::SESSION_NOT_FOUND,
            Self::DeadlineExceeded => rpc_code::DEADLINE_EXCEEDED,
            Self::TransportClosed => rpc_code::TRANSPORT_CLOSED,
            Self::UpstreamError(_) => rpc_code::UPSTREAM_ERROR,
            Self::Internal => rpc_code::INTERNAL_ERROR,
        }
    }

    /// Structured error data, if any (offending paths for invalid_arguments).
    #[must_use]
    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidArguments { paths } => Some(serde_json::json!({ "paths": paths })),
            _ => None,
        }
    }

    /// Create an `invalid_arguments` error from offending paths.
    #[must_use]
    pub fn invalid_arguments(paths: Vec<String>) -> Self {
        Self::InvalidArguments { paths }
    }
}

/// Errors from MCP tool execution.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// Error from the upstream client
    #[error("Upstream error: {0}")]
    Client(#[from] ClientError),

    /// Input validation failed against the tool's declared schema
    #[error("Invalid arguments: {}", paths.join(", "))]
    InvalidArguments {
        /// Offending field paths
        paths: Vec<String>,
    },

    /// The operation requires upstream credentials and none are bound
    #[error("Authentication required")]
    AuthenticationRequired,

    /// A sampling round-trip failed
    #[error("Sampling failed: {0}")]
    Sampling(McpError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal tool logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidArguments { paths } => Self::InvalidArguments { paths },
            ToolError::AuthenticationRequired => Self::AuthenticationRequired,
            ToolError::Sampling(inner) => inner,
            ToolError::Client(ClientError::Upstream { status, .. }) => {
                Self::UpstreamError(format!("upstream returned status {status}"))
            }
            ToolError::Client(_) => Self::UpstreamError("upstream request failed".into()),
            ToolError::Serialization(_) | ToolError::Internal(_) => Self::Internal,
        }
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;
