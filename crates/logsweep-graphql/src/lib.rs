//! Cloudflare GraphQL analytics query service
//!
//! Implements [`QueryService`] over the `firewallEventsAdaptive` dataset.
//! Each call is a single POST; retries, pacing and truncation detection are
//! left to the engine's query client.

mod query;
mod response;

pub use query::{build_filter, build_request, format_time, API_TIME_FORMAT};
pub use response::{classify_status, parse_body};

use async_trait::async_trait;
use logsweep_core::{FilterSet, Interval, QueryService, Record, ServiceError};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://api.cloudflare.com/client/v4/graphql";

/// Account credentials and zone for the analytics API.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub api_key: String,
    pub zone_id: String,
}

/// Production query service backed by reqwest.
pub struct FirewallEventsService {
    client: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
    limit: usize,
}

impl FirewallEventsService {
    /// Create a service with the given per-request timeout and row limit.
    pub fn new(
        endpoint: impl Into<String>,
        credentials: Credentials,
        limit: usize,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            credentials,
            limit,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QueryService for FirewallEventsService {
    async fn fetch(
        &self,
        interval: &Interval,
        filters: &FilterSet,
    ) -> Result<Vec<Record>, ServiceError> {
        let request = build_request(&self.credentials.zone_id, interval, filters, self.limit);

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Auth-Email", &self.credentials.email)
            .header("X-Auth-Key", &self.credentials.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        if let Some(err) = classify_status(status) {
            debug!(interval = %interval, status, "Analytics API returned error status");
            return Err(err);
        }

        let body = response.bytes().await.map_err(map_transport_error)?;
        let records = parse_body(&body)?;
        debug!(interval = %interval, count = records.len(), "Fetched firewall events");
        Ok(records)
    }
}

fn map_transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Transport(err.to_string())
    }
}
