//! Error types for sink operations

use std::fmt;

use crate::point::PointError;

/// Result type alias for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors that can occur while talking to the time-series store
#[derive(Debug)]
pub enum SinkError {
    /// The store could not be reached (refused, timed out, reset)
    Unreachable(String),

    /// The store answered but refused the request
    Rejected { status: u16, message: String },

    /// A point violated the point invariants and nothing was written
    InvalidPoint(PointError),

    /// A write was attempted before a database was selected
    NoDatabase,

    /// The handle was closed
    Closed,
}

impl SinkError {
    /// Whether the caller should discard its handle and reconnect
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SinkError::Unreachable(_) | SinkError::Closed)
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Unreachable(msg) => write!(f, "time-series store unreachable: {msg}"),
            SinkError::Rejected { status, message } => {
                write!(f, "time-series store rejected request ({status}): {message}")
            }
            SinkError::InvalidPoint(err) => write!(f, "invalid point: {err}"),
            SinkError::NoDatabase => write!(f, "no database selected"),
            SinkError::Closed => write!(f, "connection handle is closed"),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::InvalidPoint(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PointError> for SinkError {
    fn from(err: PointError) -> Self {
        SinkError::InvalidPoint(err)
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            return SinkError::Unreachable(err.to_string());
        }

        match err.status() {
            Some(status) => SinkError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => SinkError::Unreachable(err.to_string()),
        }
    }
}
