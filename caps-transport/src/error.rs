//! Error taxonomy for capability transports.

use thiserror::Error;

/// Ways a round trip can fail without producing an HTTP response.
///
/// The event queue client cares about the distinction between failures
/// that are expected during shutdown (`Cancelled`, `ConnectionReset`) and
/// everything else, which escalates its retry backoff.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request was cancelled locally before completing.
    #[error("request cancelled locally")]
    Cancelled,

    /// The connection was dropped mid-request (keep-alive failure).
    #[error("connection reset during request")]
    ConnectionReset,

    /// The request exceeded its timeout without a response.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport failure, with no usable status code.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// True for failures that are expected side effects of local
    /// cancellation or connection churn, which the event queue ignores
    /// rather than counting against its error streak.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Cancelled | Self::ConnectionReset)
    }
}
