//! Request construction for `firewallEventsAdaptive`.

use chrono::{DateTime, Utc};
use logsweep_core::{FilterSet, Interval};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Timestamp format accepted by the analytics API
pub const API_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub const LIST_FIREWALL_EVENTS: &str = r#"
query ListFirewallEvents($zoneTag: String!, $filter: FirewallEventsAdaptiveFilter_InputObject, $limit: Int!) {
  viewer {
    zones(filter: { zoneTag: $zoneTag }) {
      firewallEventsAdaptive(
        filter: $filter
        limit: $limit
        orderBy: [datetime_DESC]
      ) {
        action
        clientAsn
        clientCountryName
        clientIP
        clientRequestPath
        clientRequestQuery
        clientRequestHTTPHost
        datetime
        source
        userAgent
        rayName
        ruleId
        edgeResponseStatus
        originResponseStatus
      }
    }
  }
}
"#;

/// GraphQL request body
#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: Variables,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variables {
    pub zone_tag: String,
    pub filter: Value,
    pub limit: usize,
}

pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.format(API_TIME_FORMAT).to_string()
}

/// Build the `FirewallEventsAdaptiveFilter` object for one half-open window.
pub fn build_filter(interval: &Interval, filters: &FilterSet) -> Value {
    let mut filter = Map::new();
    filter.insert("datetime_geq".into(), json!(format_time(interval.start())));
    filter.insert("datetime_lt".into(), json!(format_time(interval.end())));

    if let Some(rule_id) = filters.rule_id() {
        filter.insert("ruleId".into(), json!(rule_id));
    }

    let countries = filters.countries();
    match countries.len() {
        0 => {}
        1 => {
            filter.insert("clientCountryName".into(), json!(countries.iter().next()));
        }
        _ => {
            filter.insert("clientCountryName_in".into(), json!(countries));
        }
    }

    let actions = filters.actions();
    match actions.len() {
        0 => {}
        1 => {
            filter.insert("action".into(), json!(actions.iter().next()));
        }
        _ => {
            filter.insert("action_in".into(), json!(actions));
        }
    }

    if filters.excludes_allow() {
        filter.insert("action_neq".into(), json!("allow"));
    }

    if let Some(host) = filters.host() {
        filter.insert(
            "clientRequestHTTPHost_like".into(),
            json!(format!("%{}%", host)),
        );
    }

    Value::Object(filter)
}

pub fn build_request(
    zone_tag: &str,
    interval: &Interval,
    filters: &FilterSet,
    limit: usize,
) -> GraphQlRequest<'static> {
    GraphQlRequest {
        query: LIST_FIREWALL_EVENTS,
        variables: Variables {
            zone_tag: zone_tag.to_string(),
            filter: build_filter(interval, filters),
            limit,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> Interval {
        Interval::new(
            Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 20, 0, 15, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_time_bounds_are_half_open() {
        let filter = build_filter(&window(), &FilterSet::new());
        assert_eq!(filter["datetime_geq"], "2025-06-20T00:00:00Z");
        assert_eq!(filter["datetime_lt"], "2025-06-20T00:15:00Z");
        assert!(filter.get("datetime_leq").is_none());
        assert_eq!(filter.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_single_and_multi_value_filters() {
        let single = FilterSet::new()
            .with_countries(["cn"])
            .with_actions(["block"]);
        let filter = build_filter(&window(), &single);
        assert_eq!(filter["clientCountryName"], "CN");
        assert_eq!(filter["action"], "block");

        let multi = FilterSet::new()
            .with_countries(["HK", "CN"])
            .with_actions(["log", "block"])
            .excluding_allow(true);
        let filter = build_filter(&window(), &multi);
        assert_eq!(filter["clientCountryName_in"], json!(["CN", "HK"]));
        assert_eq!(filter["action_in"], json!(["block", "log"]));
        assert_eq!(filter["action_neq"], "allow");
    }

    #[test]
    fn test_rule_and_host_filters() {
        let filters = FilterSet::new()
            .with_rule_id("6179ae15870a4bb7b2d480d4843b323c")
            .with_host("example.com");
        let filter = build_filter(&window(), &filters);
        assert_eq!(filter["ruleId"], "6179ae15870a4bb7b2d480d4843b323c");
        assert_eq!(filter["clientRequestHTTPHost_like"], "%example.com%");
    }

    #[test]
    fn test_request_body_shape() {
        let request = build_request("zone-1", &window(), &FilterSet::new(), 5000);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["variables"]["zoneTag"], "zone-1");
        assert_eq!(body["variables"]["limit"], 5000);
        assert!(body["query"].as_str().unwrap().contains("firewallEventsAdaptive"));
    }
}
