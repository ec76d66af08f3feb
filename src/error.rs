//! Stable error taxonomy for the query core.

use std::fmt;

/// Stable, user-visible error kind. The name itself is part of the contract —
/// callers match on it, so variants are never renamed once shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    InvalidTimeRange,
    InvalidParameter,
    BackendUnavailable,
    ReadFailed,
    DeadlineExceeded,
    CapacityExceeded,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidTimeRange => "INVALID_TIME_RANGE",
            ErrorKind::InvalidParameter => "INVALID_PARAMETER",
            ErrorKind::BackendUnavailable => "BACKEND_UNAVAILABLE",
            ErrorKind::ReadFailed => "READ_FAILED",
            ErrorKind::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorKind::CapacityExceeded => "CAPACITY_EXCEEDED",
        };
        f.write_str(s)
    }
}

/// The error type returned by every public `Engine` operation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct QueryError {
    pub kind: ErrorKind,
    pub message: String,
    /// Offending parameter name, when the error can be attributed to one field.
    pub parameter: Option<String>,
}

impl QueryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            parameter: None,
        }
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }

    pub fn invalid_time_range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTimeRange, message)
    }

    pub fn invalid_parameter(message: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, message).with_parameter(parameter)
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message)
    }

    pub fn read_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReadFailed, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, message)
    }

    pub fn capacity_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CapacityExceeded, message)
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
