//! Error types for the REST facade.
//!
//! # Design
//! Every failure is terminal for the call that produced it; nothing in this
//! crate retries or substitutes defaults. `Timeout` is kept apart from
//! `Transport` so callers can layer their own retry policy on top, and
//! `Status` carries the raw status and body of any non-2xx response.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by `RestClient` construction and verb methods.
#[derive(Debug, Error)]
pub enum RestError {
    /// Invalid serialization-policy or client options. Raised while the
    /// client is being built, never by a call.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The URL or a header supplied to a call could not be used.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The request body could not be encoded as JSON.
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// Connection, TLS, DNS or protocol failure reported by the transport.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The exchange task ended without producing an outcome.
    #[error("request task ended without a result")]
    TaskFailed,

    /// No response arrived within the client's response timeout.
    #[error("no response within {after:?}")]
    Timeout { after: Duration },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body does not fit the expected response type.
    #[error("failed to decode response as {expected}: {source}")]
    Decode {
        expected: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RestError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        RestError::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
        RestError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RestError::Timeout { .. })
    }

    /// HTTP status of a `Status` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
