use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::{ErrorCode, RequestId};

/// Errors surfaced by the correlation layer.
///
/// Every variant except [`RpcError::Serialization`] and
/// [`RpcError::Transport`] is a *resolution* of a pending request: it is
/// delivered to exactly one waiting caller, never broadcast.
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    /// No response arrived before the request's timeout elapsed.
    #[error("request {request_id} timed out after {after:?}")]
    Timeout {
        request_id: RequestId,
        after: Duration,
    },

    /// The peer answered, but the answer could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer answered with a CALLERROR.
    #[error("{code}: {description}")]
    Application {
        code: ErrorCode,
        description: String,
        details: Value,
    },

    /// The connection to the destination closed while the request was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// The request was cancelled locally before it resolved.
    #[error("request cancelled")]
    Cancelled,

    /// A request with this id is already in flight.
    #[error("duplicate request id: {0}")]
    DuplicateRequestId(RequestId),

    /// Timeouts must be strictly positive.
    #[error("timeout must be greater than zero")]
    InvalidTimeout,

    /// The configured in-flight limit was reached.
    #[error("too many pending requests (limit {0})")]
    TooManyPending(usize),

    /// The transport could not carry the frame.
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RpcError {
    /// Build an application error from an OCPP error code.
    pub fn application(code: ErrorCode, description: impl Into<String>) -> Self {
        // ---
        RpcError::Application {
            code,
            description: description.into(),
            details: Value::Object(Default::default()),
        }
    }

    /// Whether a caller-side retry may reasonably succeed.
    ///
    /// Only timeouts and transport failures qualify; a CALLERROR is the peer's
    /// considered answer and is never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Timeout { .. } | RpcError::Transport(_))
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Serialization(err.to_string())
    }
}

/// Result type alias for correlation operations.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_retryable_classification() {
        // ---
        let timeout = RpcError::Timeout {
            request_id: RequestId::from("t-1"),
            after: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());
        assert!(RpcError::Transport("link down".into()).is_retryable());

        assert!(!RpcError::ConnectionClosed.is_retryable());
        assert!(!RpcError::Cancelled.is_retryable());
        assert!(!RpcError::application(ErrorCode::NotImplemented, "nope").is_retryable());
    }

    #[test]
    fn test_application_display() {
        // ---
        let err = RpcError::application(ErrorCode::NotSupported, "no such thing");
        assert_eq!(err.to_string(), "NotSupported: no such thing");
    }
}
