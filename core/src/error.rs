//! Error types for the ContentChef client.
//!
//! # Design
//! Every failure is returned to the caller; nothing is retried. Configuration
//! problems surface from constructors, encoding problems surface before any
//! network I/O, and everything after the request leaves the process is either
//! a transport, context, API or decode failure.

use std::fmt;

use thiserror::Error;

use crate::http::HttpMethod;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the client, channels and query encoder.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid client or channel configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A call was issued without a cancellation context.
    #[error("context must be present")]
    MissingContext,

    /// A request path could not be parsed or resolved.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Query options or a request body could not be encoded.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// The caller's context was cancelled or its deadline passed.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The transport failed before a response was received.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a non-2xx status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A success response carried a body that is not valid JSON for the target.
    #[error("decoding response failed: {0}")]
    Decode(#[source] serde_json::Error),
}

impl Error {
    /// Returns the API error when the server rejected the request.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(err) => Some(err),
            _ => None,
        }
    }
}

/// Why a cancellation context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Failures raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("stopped after too many redirects")]
    TooManyRedirects,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The caller's context ended while the exchange was still in flight.
    #[error("request abandoned before completion")]
    Abandoned,
    #[error("{0}")]
    Other(String),
}

/// A non-2xx response from the content API.
///
/// `message` is taken from the `message` field of a JSON error body, or is
/// the raw body text when the body is not JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub method: HttpMethod,
    pub url: String,
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} {}",
            self.method, self.url, self.status, self.message
        )
    }
}

impl std::error::Error for ApiError {}
