//! The error taxonomy: what the proxy recovers from locally, what it retries, and what it turns
//! straight into a response envelope.

use crate::model::ApiResult;
use thiserror::Error;

/// A proxy-level error, classified by how it should be handled and reported.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Malformed form data or a missing required field.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An upload's filename ends in `/null`.
    #[error("a /module/ path is needed")]
    NullFilename,

    /// Primary and shadow (or primary alone, if no shadow is configured) both returned 404.
    #[error("{0}")]
    NotFound(String),

    /// A backend I/O failure or non-2xx/404 response. Recoverable via retry + shadow failover.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Rejected by whitelist or `Uni-Source` admission control.
    #[error("{0}")]
    AccessDenied(String),

    /// The client reset the connection mid-write; reported via the 1000 sentinel, not 500.
    #[error("connection reset by client")]
    ConnectionReset,

    /// A parse, JSON, or database failure with no more specific classification.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Whether a failed backend call of this kind should be retried by the retry controller.
    ///
    /// Only `Upstream` recovers locally; `NotFound` and `AccessDenied` are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProxyError::Upstream(_))
    }

    /// Converts the error into the response envelope sent to the client.
    pub fn into_api_result(self) -> ApiResult {
        match self {
            ProxyError::BadRequest(detail) => ApiResult::error(400, detail),
            ProxyError::NullFilename => ApiResult::error(400, "a /module/ path is needed"),
            ProxyError::NotFound(detail) => ApiResult::error(404, detail),
            ProxyError::Upstream(detail) => ApiResult::error(500, detail),
            ProxyError::AccessDenied(detail) => ApiResult::error(406, detail),
            ProxyError::ConnectionReset => ApiResult::connection_reset(),
            ProxyError::Internal(detail) => ApiResult::error(500, detail),
        }
    }
}

impl From<weeder_core::DirError> for ProxyError {
    fn from(e: weeder_core::DirError) -> Self {
        match e.kind() {
            weeder_core::DirErrorKind::NotFound => ProxyError::NotFound(e.to_string()),
            weeder_core::DirErrorKind::BackendUnavailable => ProxyError::Upstream(e.to_string()),
            weeder_core::DirErrorKind::InvalidInput => ProxyError::BadRequest(e.to_string()),
        }
    }
}

/// Detects a "reset by peer" condition: a write-out failure whose message contains "reset" is
/// reported as the 1000 sentinel rather than a generic 500.
///
/// A future revision may switch to matching on `std::io::ErrorKind::ConnectionReset` directly;
/// the substring match is kept here because some backends surface the condition only in the
/// error string, not the io::ErrorKind.
pub fn is_reset_by_peer(message: &str) -> bool {
    message.to_lowercase().contains("reset")
}
