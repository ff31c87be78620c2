use thiserror::Error;

use crate::cart::LocalLineId;

/// Failure reported by a [`crate::transport::CommerceTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request cancelled")]
    Cancelled,
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("server returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl TransportError {
    /// True when the server understood the request and refused it
    /// (4xx other than timeout/rate-limit statuses).
    pub fn is_rejection(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            TransportError::Connect(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// A newer query superseded this one. Absorbed by the controllers and
    /// never published as a failure.
    #[error("request superseded by a newer query")]
    Cancelled,
    #[error("network error: {0}")]
    Network(#[source] TransportError),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("cart line {local_id} could not be reconciled: {reason}")]
    ReconciliationConflict {
        local_id: LocalLineId,
        reason: String,
    },
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => ClientError::Cancelled,
            other => ClientError::Network(other),
        }
    }
}
