//! Error types for the trusted proxy

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for trusted proxy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the trusted proxy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error (registry or device unreachable)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Registry answered with an error status
    #[error("registry returned {status} for {path}")]
    UpstreamStatus { status: u16, path: String },

    /// Requested target host is not a trusted device
    #[error("targetHost {0} is not a trusted device")]
    UnresolvedTarget(String),

    /// Request finished without producing a completion
    #[error("request was not completed")]
    Incomplete,

    /// Malformed inbound request
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Inbound method the worker does not serve
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Routing channel reported a failure for a proxied request
    #[error("proxy dispatch failed: {message}")]
    ProxyDispatch { status: u16, message: String },
}

impl Error {
    /// HTTP status carried to the caller when this error completes a request
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnresolvedTarget(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadRequest(_) | Self::Serialization(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamStatus { .. } | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::ProxyDispatch { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Config(_) | Self::Io(_) | Self::Toml(_) | Self::Incomplete => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
