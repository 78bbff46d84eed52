use thiserror::Error;

use crate::TripId;

/// An inbound frame that could not be turned into a point message.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The payload is not a well-formed JSON object of the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(String),
    /// A required field is absent, `null` or empty.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    /// A field that must be a JSON number is not.
    #[error("field `{0}` must be numeric")]
    NotNumeric(&'static str),
    /// A coordinate lies outside its valid range.
    #[error("field `{0}` is out of range")]
    OutOfRange(&'static str),
    /// The timestamp is not RFC 3339.
    #[error("timestamp `{0}` is not RFC 3339")]
    BadTimestamp(String),
}

/// Failures of the bidirectional connection a session runs over.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The client closed the connection normally or the stream ended.
    #[error("connection closed")]
    Closed,
    /// No frame arrived within the configured idle timeout.
    #[error("connection idle for too long")]
    IdleTimeout,
    /// Any other read or write failure, including abnormal close codes.
    #[error("transport failure: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether this error ends the session like a graceful close.
    #[must_use]
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Closed | Self::IdleTimeout)
    }
}

/// Errors reported by the ephemeral point store or the durable trip store.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected operation: {0}")]
    Rejected(String),
    #[error("trip {0} not found")]
    TripNotFound(TripId),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ComputationError {
    /// The trace read back at completion holds no points.
    #[error("trace `{0}` holds no points")]
    EmptyTrace(String),
}
