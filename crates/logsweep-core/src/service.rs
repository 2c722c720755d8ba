//! Query service abstraction
//!
//! The transport (HTTP/GraphQL, authentication, wire schema) lives behind
//! [`QueryService`]; the engine only sees records and typed errors.

use crate::error::ServiceError;
use crate::filter::FilterSet;
use crate::interval::Interval;
use async_trait::async_trait;

/// Opaque record payload. The engine only counts records; consumers
/// interpret the JSON.
pub type Record = serde_json::Value;

/// One bounded query primitive against the analytics API.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Fetch at most the server's row limit of records matching `filters`
    /// whose timestamp falls in the half-open `interval`.
    async fn fetch(&self, interval: &Interval, filters: &FilterSet)
        -> Result<Vec<Record>, ServiceError>;
}
