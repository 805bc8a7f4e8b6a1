//! Error taxonomy shared by every engine.
//!
//! - [`RouterError`]: per-request failures. Handlers and middlewares return
//!   it; the adapter boundary turns it into exactly one response through the
//!   installed [`ErrorHandler`](crate::adapter::ErrorHandler).
//! - [`RouteError`]: registration failures, surfaced synchronously.
//! - [`ServeError`]: bind/start failures.
//! - [`AdapterError`]: engine construction failures.

use axum::http::{Method, StatusCode};

use crate::config::{ConfigError, EngineType};

/// Boxed error accepted from handler code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result returned by handlers and middlewares.
pub type HandlerResult = Result<(), RouterError>;

/// Per-request error.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A response-writing method was called after the response was written.
    #[error("response already written")]
    AlreadyWritten,

    /// `bind` could not find a decoder for the request body.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// `redirect` was called with a status outside 300..=308.
    #[error("invalid redirect code: {0}")]
    InvalidRedirectCode(u16),

    /// The request body or query string did not decode.
    #[error("failed to bind request: {0}")]
    Bind(String),

    /// Handler-chosen status and message.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// The request scope was cancelled (client gone or forced shutdown).
    #[error("request cancelled")]
    Cancelled,

    /// The request scope deadline elapsed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// A handler panicked; recovered at the adapter boundary.
    #[error("handler panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Handler(#[from] BoxError),
}

impl RouterError {
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        RouterError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(StatusCode::BAD_REQUEST, message)
    }

    /// Wrap any error type coming out of downstream I/O.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RouterError::Handler(Box::new(err))
    }

    /// Status the default error handler answers with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RouterError::Http { status, .. } => *status,
            RouterError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RouterError::Bind(_) => StatusCode::BAD_REQUEST,
            RouterError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            RouterError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            RouterError::AlreadyWritten
            | RouterError::InvalidRedirectCode(_)
            | RouterError::Panic(_)
            | RouterError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Route or middleware registration failure.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("invalid route path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("route {method} {path} is already registered")]
    Duplicate { method: Method, path: String },

    #[error("route {path:?} conflicts with registered route {existing:?}")]
    Conflict { path: String, existing: String },

    #[error("native middleware for {native} cannot be used on the {engine} engine")]
    NativeMismatch {
        engine: EngineType,
        native: EngineType,
    },

    #[error("routes cannot be registered after the server has started")]
    Started,
}

/// Failure to start serving.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("server already started")]
    AlreadyStarted,

    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to construct an adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("unknown engine type: {0}")]
    UnknownEngine(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            RouterError::UnsupportedMediaType("text/csv".into()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(RouterError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(RouterError::Panic("boom".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(RouterError::DeadlineExceeded.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn http_error_displays_message() {
        let err = RouterError::http(StatusCode::CONFLICT, "taken");
        assert_eq!(err.to_string(), "taken");
    }
}
