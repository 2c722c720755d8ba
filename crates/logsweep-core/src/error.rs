//! Error types for the collection engine

use crate::filter::FilterDimension;
use crate::interval::{Interval, InvalidInterval};
use thiserror::Error;

/// Errors produced by a [`QueryService`](crate::QueryService) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Explicit throttling signal from the service (HTTP 429 or equivalent)
    #[error("rate limited by query service")]
    RateLimited,

    #[error("query timed out")]
    Timeout,

    /// 5xx or other unexpected status
    #[error("query service returned status {status}")]
    Server { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    /// Response could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("authentication rejected (status {status})")]
    Unauthorized { status: u16 },

    /// The service rejected a filter field. `dimension` is `None` when the
    /// field does not map to a known filter dimension.
    #[error("unsupported filter field: {message}")]
    UnsupportedField {
        dimension: Option<FilterDimension>,
        message: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    /// Whether retrying the same query may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::Timeout
                | Self::Server { .. }
                | Self::Transport(_)
                | Self::Malformed(_)
        )
    }

    /// Stable short code for log fields
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited => "E101",
            Self::Timeout => "E102",
            Self::Server { .. } => "E103",
            Self::Transport(_) => "E104",
            Self::Malformed(_) => "E105",
            Self::Unauthorized { .. } => "E106",
            Self::UnsupportedField { .. } => "E107",
            Self::InvalidRequest(_) => "E108",
        }
    }
}

/// Errors escalated by the query client. Exhausted retries are not an error;
/// they surface as [`QueryResult::exhausted`](crate::QueryResult::exhausted).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("fatal query error [{code}]: {0}", code = .0.code())]
    Fatal(ServiceError),

    #[error("filter dimension '{dimension}' not supported by the service: {message}")]
    UnsupportedFilter {
        dimension: FilterDimension,
        message: String,
    },

    #[error("query cancelled")]
    Cancelled,
}

/// Failure while planning or fetching one base interval.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A query for `interval` ran out of retries; its empty result cannot be
    /// trusted as "no records".
    #[error("retries exhausted for {interval}")]
    Exhausted { interval: Interval },
}

/// Errors that end a whole collection run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error("invalid time range: {0}")]
    InvalidRange(#[from] InvalidInterval),

    #[error("invalid collector options: {0}")]
    InvalidOptions(String),

    #[error("run aborted: filter dimension '{dimension}' is not supported: {message}")]
    UnsupportedFilter {
        dimension: FilterDimension,
        message: String,
    },

    #[error("query service unavailable: all {intervals} base intervals failed")]
    ServiceUnavailable { intervals: usize },

    #[error("collection cancelled")]
    Cancelled,
}

/// Errors from an [`ExportSink`](crate::ExportSink).
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}
