//! Query predicates and their canonical signature.
//!
//! A [`FilterSignature`] identifies the active predicates independent of the
//! order in which set-valued filters were supplied. Two queries with equal
//! signature and interval must truncate the same way, which is what lets the
//! partition cache key plans by `(interval, signature)`.

use std::collections::BTreeSet;
use std::fmt;

/// One independently disableable filter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterDimension {
    Host,
    RuleId,
    Country,
    Action,
    ExcludeAllow,
}

impl FilterDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::RuleId => "rule_id",
            Self::Country => "country",
            Self::Action => "action",
            Self::ExcludeAllow => "exclude_allow",
        }
    }
}

impl fmt::Display for FilterDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical, deterministic encoding of a [`FilterSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterSignature(String);

impl FilterSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Active query predicates.
///
/// Country codes are stored upper-case and actions lower-case; blank entries
/// are dropped on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    host: Option<String>,
    rule_id: Option<String>,
    countries: BTreeSet<String>,
    actions: BTreeSet<String>,
    exclude_allow: bool,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = non_blank(host.into());
        self
    }

    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = non_blank(rule_id.into());
        self
    }

    pub fn with_countries<I, S>(mut self, countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.countries.extend(
            countries
                .into_iter()
                .filter_map(|c| non_blank(c.as_ref().to_string()))
                .map(|c| c.to_uppercase()),
        );
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.actions.extend(
            actions
                .into_iter()
                .filter_map(|a| non_blank(a.as_ref().to_string()))
                .map(|a| a.to_lowercase()),
        );
        self
    }

    pub fn excluding_allow(mut self, exclude: bool) -> Self {
        self.exclude_allow = exclude;
        self
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn rule_id(&self) -> Option<&str> {
        self.rule_id.as_deref()
    }

    pub fn countries(&self) -> &BTreeSet<String> {
        &self.countries
    }

    pub fn actions(&self) -> &BTreeSet<String> {
        &self.actions
    }

    pub fn excludes_allow(&self) -> bool {
        self.exclude_allow
    }

    pub fn is_active(&self, dimension: FilterDimension) -> bool {
        match dimension {
            FilterDimension::Host => self.host.is_some(),
            FilterDimension::RuleId => self.rule_id.is_some(),
            FilterDimension::Country => !self.countries.is_empty(),
            FilterDimension::Action => !self.actions.is_empty(),
            FilterDimension::ExcludeAllow => self.exclude_allow,
        }
    }

    /// Copy of this set with one dimension removed.
    pub fn without(&self, dimension: FilterDimension) -> Self {
        let mut reduced = self.clone();
        match dimension {
            FilterDimension::Host => reduced.host = None,
            FilterDimension::RuleId => reduced.rule_id = None,
            FilterDimension::Country => reduced.countries.clear(),
            FilterDimension::Action => reduced.actions.clear(),
            FilterDimension::ExcludeAllow => reduced.exclude_allow = false,
        }
        reduced
    }

    pub fn signature(&self) -> FilterSignature {
        let mut parts = Vec::new();

        if let Some(host) = &self.host {
            parts.push(format!("host={}", host));
        }
        if let Some(rule_id) = &self.rule_id {
            parts.push(format!("rule={}", rule_id));
        }
        if !self.countries.is_empty() {
            parts.push(format!("country={}", join(&self.countries)));
        }
        if !self.actions.is_empty() {
            parts.push(format!("action={}", join(&self.actions)));
        }
        if self.exclude_allow {
            parts.push("action!=allow".to_string());
        }

        if parts.is_empty() {
            FilterSignature("*".to_string())
        } else {
            FilterSignature(parts.join(";"))
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn join(values: &BTreeSet<String>) -> String {
    values.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_order_independent() {
        let a = FilterSet::new().with_countries(["hk", "CN", "sg"]);
        let b = FilterSet::new().with_countries(["SG", "cn", "HK"]);
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature().as_str(), "country=CN,HK,SG");
    }

    #[test]
    fn test_signature_covers_every_dimension() {
        let filters = FilterSet::new()
            .with_host("example.com")
            .with_rule_id("abc123")
            .with_countries(["CN"])
            .with_actions(["Block", "log"])
            .excluding_allow(true);

        assert_eq!(
            filters.signature().as_str(),
            "host=example.com;rule=abc123;country=CN;action=block,log;action!=allow"
        );
        assert_eq!(FilterSet::new().signature().as_str(), "*");
    }

    #[test]
    fn test_blank_values_are_inactive() {
        let filters = FilterSet::new()
            .with_host("  ")
            .with_rule_id("")
            .with_countries(["", " "]);
        assert!(!filters.is_active(FilterDimension::Host));
        assert!(!filters.is_active(FilterDimension::RuleId));
        assert!(!filters.is_active(FilterDimension::Country));
    }

    #[test]
    fn test_without_removes_only_that_dimension() {
        let filters = FilterSet::new()
            .with_rule_id("abc")
            .with_countries(["CN", "HK"]);
        let reduced = filters.without(FilterDimension::RuleId);

        assert!(!reduced.is_active(FilterDimension::RuleId));
        assert!(reduced.is_active(FilterDimension::Country));
        assert_ne!(filters.signature(), reduced.signature());
    }
}
