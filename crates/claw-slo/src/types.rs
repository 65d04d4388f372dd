//! Core types for SLO rule generation.
//!
//! This module provides the data model shared by every stage of a pass:
//! - [`ServiceLevelObjective`]: the source object authored by users
//! - [`Slo`], [`Sli`], [`Alerting`]: one SLO entry inside the source object
//! - [`Condition`]: the single status condition written after each pass
//! - [`RuleGroup`], [`Rule`], [`Expression`], [`RuleDuration`]: the generic
//!   rule model produced by the derivation engine

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SloError};

/// API version of the source object.
pub const API_VERSION: &str = "slo.clawbernetes.io/v1alpha1";

/// Kind of the source object.
pub const KIND: &str = "ServiceLevelObjective";

/// Condition type written to the source object's status.
pub const CONDITION_TYPE: &str = "ServiceLevelObjectiveReconciled";

/// Prometheus duration format (`1d`, `2h30m`, `500ms`, `0`).
static DURATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0|(([0-9]+)y)?(([0-9]+)w)?(([0-9]+)d)?(([0-9]+)h)?(([0-9]+)m)?(([0-9]+)s)?(([0-9]+)ms)?)$")
        .unwrap_or_else(|_| unreachable!())
});

/// Identifies an object by namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace of the object.
    pub namespace: String,
    /// Name of the object.
    pub name: String,
}

impl ObjectKey {
    /// Creates a new object key.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Link from a generated object to the object that owns it.
///
/// The platform garbage-collects owned objects once the owner is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// API version of the owner.
    pub api_version: String,
    /// Kind of the owner.
    pub kind: String,
    /// Name of the owner.
    pub name: String,
    /// UID of the owner.
    pub uid: String,
    /// Whether the owner is the managing controller.
    pub controller: bool,
    /// Whether deletion of the owner waits for this object.
    pub block_owner_deletion: bool,
}

/// Metadata common to all stored objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Name of the object.
    pub name: String,
    /// Namespace of the object.
    pub namespace: String,
    /// Store-assigned unique id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    /// Incremented by the store on every spec change.
    #[serde(default)]
    pub generation: i64,
    /// Opaque concurrency token, changed on every write.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    /// Object labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Owners of this object.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Creates metadata with a name and namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Returns the key of the object.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// The SLI queries of an SLO.
///
/// Both queries are templates that must contain the `${window}` placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sli {
    /// Query for all events, e.g. all requests.
    #[serde(default)]
    pub total_query: String,
    /// Query for failed events, e.g. all 5xx requests.
    #[serde(default)]
    pub error_query: String,
}

/// Alerting settings of an SLO.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alerting {
    /// Disables generation of all alerting rules.
    #[serde(default)]
    pub disabled: bool,
    /// Severities for the absent alert and the four burn rate alerts.
    ///
    /// Ignored unless it holds exactly five entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub severities: Vec<String>,
}

/// A single SLO entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slo {
    /// Name of the SLO, e.g. "availability" or "latency".
    #[serde(default)]
    pub name: String,
    /// Objective as a percentage string, e.g. "99.9".
    #[serde(default)]
    pub objective: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// The queries measuring the SLI.
    #[serde(default)]
    pub sli: Sli,
    /// Alerting settings.
    #[serde(default)]
    pub alerting: Alerting,
}

/// Desired state of a [`ServiceLevelObjective`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLevelObjectiveSpec {
    /// The SLOs of the service.
    #[serde(default)]
    pub slos: Vec<Slo>,
}

/// Outcome recorded in the status condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionReason {
    /// The pass wrote the downstream document.
    Succeeded,
    /// The pass was skipped or aborted.
    Failed,
}

impl ConditionReason {
    /// Returns the reason as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A status condition on the source object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, always [`CONDITION_TYPE`].
    #[serde(rename = "type")]
    pub type_: String,
    /// Condition status, always `"True"`.
    pub status: String,
    /// Generation of the source the pass observed.
    pub observed_generation: i64,
    /// When the condition was written.
    pub last_transition_time: DateTime<Utc>,
    /// Outcome of the pass.
    pub reason: ConditionReason,
    /// Human-readable outcome.
    pub message: String,
}

/// Observed state of a [`ServiceLevelObjective`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLevelObjectiveStatus {
    /// Holds at most one condition, replaced on every pass.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// The source object: a set of SLOs for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLevelObjective {
    /// API version, [`API_VERSION`].
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Kind, [`KIND`].
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: ServiceLevelObjectiveSpec,
    /// Observed state.
    #[serde(default)]
    pub status: ServiceLevelObjectiveStatus,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

impl ServiceLevelObjective {
    /// Creates a source object with no SLOs.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::new(namespace, name),
            spec: ServiceLevelObjectiveSpec::default(),
            status: ServiceLevelObjectiveStatus::default(),
        }
    }

    /// Adds an SLO entry.
    #[must_use]
    pub fn with_slo(mut self, slo: Slo) -> Self {
        self.spec.slos.push(slo);
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the key of the object.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    /// Builds the controller owner reference pointing at this object.
    #[must_use]
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.metadata.name.clone(),
            uid: self.metadata.uid.clone(),
            controller: true,
            block_owner_deletion: true,
        }
    }

    /// Returns the current condition, if any.
    #[must_use]
    pub fn condition(&self) -> Option<&Condition> {
        self.status.conditions.first()
    }
}

/// A rule duration such as `30s` or `1h`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleDuration(String);

impl RuleDuration {
    /// Parses a duration literal.
    ///
    /// # Errors
    ///
    /// Returns `SloError::InvalidDuration` if the literal is empty or not in
    /// the Prometheus duration format.
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() || !DURATION_REGEX.is_match(&value) {
            return Err(SloError::InvalidDuration { value });
        }
        Ok(Self(value))
    }

    /// Returns the duration literal.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RuleDuration {
    type Error = SloError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<RuleDuration> for String {
    fn from(duration: RuleDuration) -> Self {
        duration.0
    }
}

/// A rule expression, either a plain integer or a query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expression {
    /// Integer constant.
    Int(i64),
    /// Query text.
    Query(String),
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Query(query) => f.write_str(query),
        }
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for Expression {
    fn from(query: String) -> Self {
        Self::Query(query)
    }
}

/// A generated rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Precomputes a named time series.
    Recording {
        /// Name of the recorded series.
        record: String,
        /// Expression to record.
        expr: Expression,
        /// Labels attached to the series.
        labels: BTreeMap<String, String>,
    },
    /// Fires once its expression has held for `for_duration`.
    Alerting {
        /// Name of the alert.
        alert: String,
        /// Condition of the alert.
        expr: Expression,
        /// How long the condition must hold before firing.
        for_duration: RuleDuration,
        /// Labels attached to the alert.
        labels: BTreeMap<String, String>,
        /// Annotations attached to the alert.
        annotations: BTreeMap<String, String>,
    },
}

impl Rule {
    /// Returns the record or alert name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Recording { record, .. } => record,
            Self::Alerting { alert, .. } => alert,
        }
    }

    /// Returns the expression.
    #[must_use]
    pub const fn expr(&self) -> &Expression {
        match self {
            Self::Recording { expr, .. } | Self::Alerting { expr, .. } => expr,
        }
    }

    /// Returns the labels.
    #[must_use]
    pub const fn labels(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Recording { labels, .. } | Self::Alerting { labels, .. } => labels,
        }
    }

    /// Returns the `for` duration of an alerting rule.
    #[must_use]
    pub const fn for_duration(&self) -> Option<&RuleDuration> {
        match self {
            Self::Recording { .. } => None,
            Self::Alerting { for_duration, .. } => Some(for_duration),
        }
    }

    /// Returns true for alerting rules.
    #[must_use]
    pub const fn is_alerting(&self) -> bool {
        matches!(self, Self::Alerting { .. })
    }
}

/// An ordered group of rules evaluated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGroup {
    /// Name of the group.
    pub name: String,
    /// Evaluation interval of the group.
    pub interval: RuleDuration,
    /// Rules in generation order.
    pub rules: Vec<Rule>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("30s" ; "seconds")]
    #[test_case("2m" ; "minutes")]
    #[test_case("1d" ; "days")]
    #[test_case("2h30m" ; "compound")]
    #[test_case("500ms" ; "milliseconds")]
    #[test_case("0" ; "zero")]
    fn duration_accepts(value: &str) {
        let duration = RuleDuration::parse(value).unwrap();
        assert_eq!(duration.as_str(), value);
    }

    #[test_case("" ; "empty")]
    #[test_case("5" ; "missing unit")]
    #[test_case("1x" ; "unknown unit")]
    #[test_case("m5" ; "unit first")]
    #[test_case("1m1h" ; "wrong order")]
    fn duration_rejects(value: &str) {
        assert!(matches!(
            RuleDuration::parse(value),
            Err(SloError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn duration_serializes_as_string() {
        let duration = RuleDuration::parse("15m").unwrap();
        assert_eq!(serde_json::to_string(&duration).unwrap(), "\"15m\"");
        let back: RuleDuration = serde_json::from_str("\"15m\"").unwrap();
        assert_eq!(back, duration);
        assert!(serde_json::from_str::<RuleDuration>("\"soon\"").is_err());
    }

    #[test]
    fn expression_is_untagged() {
        assert_eq!(serde_json::to_string(&Expression::Int(2_419_200)).unwrap(), "2419200");
        assert_eq!(
            serde_json::to_string(&Expression::Query("up".into())).unwrap(),
            "\"up\""
        );
        assert_eq!(Expression::Int(7).to_string(), "7");
    }

    #[test]
    fn object_key_display() {
        assert_eq!(ObjectKey::new("default", "api").to_string(), "default/api");
    }

    #[test]
    fn source_object_deserializes_with_defaults() {
        let json = r#"{
            "metadata": {"name": "api", "namespace": "default"},
            "spec": {"slos": [{
                "name": "availability",
                "objective": "99.9",
                "sli": {"totalQuery": "t[${window}]", "errorQuery": "e[${window}]"}
            }]}
        }"#;
        let slo: ServiceLevelObjective = serde_json::from_str(json).unwrap();
        assert_eq!(slo.api_version, API_VERSION);
        assert_eq!(slo.kind, KIND);
        assert_eq!(slo.metadata.generation, 0);
        assert_eq!(slo.spec.slos.len(), 1);
        assert!(!slo.spec.slos[0].alerting.disabled);
        assert!(slo.spec.slos[0].alerting.severities.is_empty());
        assert!(slo.condition().is_none());
    }

    #[test]
    fn owner_reference_points_at_source() {
        let mut slo = ServiceLevelObjective::new("default", "api");
        slo.metadata.uid = "uid-1".to_string();
        let owner = slo.owner_reference();
        assert_eq!(owner.kind, KIND);
        assert_eq!(owner.name, "api");
        assert_eq!(owner.uid, "uid-1");
        assert!(owner.controller);
        assert!(owner.block_owner_deletion);
    }

    #[test]
    fn rule_accessors() {
        let rule = Rule::Recording {
            record: "slo:total".into(),
            expr: Expression::Query("up".into()),
            labels: BTreeMap::new(),
        };
        assert_eq!(rule.name(), "slo:total");
        assert!(rule.for_duration().is_none());
        assert!(!rule.is_alerting());
    }
}
