//! Response decoding and error classification.

use logsweep_core::{FilterDimension, Record, ServiceError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    viewer: Option<Viewer>,
}

#[derive(Debug, Deserialize)]
struct Viewer {
    #[serde(default)]
    zones: Vec<Zone>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Zone {
    #[serde(default)]
    firewall_events_adaptive: Option<Vec<Record>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
}

/// Map a non-success HTTP status to a service error.
pub fn classify_status(status: u16) -> Option<ServiceError> {
    match status {
        200..=299 => None,
        429 => Some(ServiceError::RateLimited),
        401 | 403 => Some(ServiceError::Unauthorized { status }),
        400 => Some(ServiceError::InvalidRequest(format!("HTTP {}", status))),
        _ => Some(ServiceError::Server { status }),
    }
}

/// Decode a 2xx response body into records.
///
/// A response without data for the zone is an empty page.
pub fn parse_body(body: &[u8]) -> Result<Vec<Record>, ServiceError> {
    let response: GraphQlResponse =
        serde_json::from_slice(body).map_err(|e| ServiceError::Malformed(e.to_string()))?;

    if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
        return Err(classify_errors(&errors));
    }

    Ok(response
        .data
        .and_then(|data| data.viewer)
        .and_then(|viewer| viewer.zones.into_iter().next())
        .and_then(|zone| zone.firewall_events_adaptive)
        .unwrap_or_default())
}

fn classify_errors(errors: &[GraphQlError]) -> ServiceError {
    let message = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    for error in errors {
        if let Some(dimension) = field_dimension(&error.message) {
            return ServiceError::UnsupportedField {
                dimension: Some(dimension),
                message,
            };
        }
    }

    if message.to_lowercase().contains("unknown field") {
        return ServiceError::UnsupportedField {
            dimension: None,
            message,
        };
    }

    // Anything else is treated like a server hiccup and retried.
    ServiceError::Malformed(message)
}

/// Filter dimension named by a GraphQL field error, if any.
fn field_dimension(message: &str) -> Option<FilterDimension> {
    if message.contains("ruleId") {
        Some(FilterDimension::RuleId)
    } else if message.contains("clientCountryName") {
        Some(FilterDimension::Country)
    } else if message.contains("clientRequestHTTPHost") {
        Some(FilterDimension::Host)
    } else if message.contains("action_neq") {
        Some(FilterDimension::ExcludeAllow)
    } else if message.contains("action_in") || message.contains("\"action\"") {
        Some(FilterDimension::Action)
    } else {
        None
    }
}
