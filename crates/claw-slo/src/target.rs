//! Downstream rule documents.
//!
//! The generic [`RuleGroup`] model is emitted in one of two wire formats,
//! selected once per process through [`TargetFormat`]:
//!
//! - [`TargetFormat::Prometheus`] emits a [`PrometheusRule`]. Its rules are a
//!   field-for-field copy of the generic model, so expressions stay typed and
//!   durations stay validated.
//! - [`TargetFormat::VictoriaMetrics`] emits a [`VmRule`], where durations and
//!   expressions are plain strings.
//!
//! Both keep group and rule order exactly as derived.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{
    Expression, ObjectKey, ObjectMeta, Rule, RuleDuration, RuleGroup, ServiceLevelObjective,
};

/// API version of [`PrometheusRule`].
pub const PROMETHEUS_API_VERSION: &str = "monitoring.coreos.com/v1";

/// Kind of [`PrometheusRule`].
pub const PROMETHEUS_KIND: &str = "PrometheusRule";

/// API version of [`VmRule`].
pub const VM_API_VERSION: &str = "operator.victoriametrics.com/v1beta1";

/// Kind of [`VmRule`].
pub const VM_KIND: &str = "VMRule";

/// The downstream format rule documents are emitted in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Prometheus Operator `PrometheusRule`.
    #[default]
    Prometheus,
    /// VictoriaMetrics Operator `VMRule`.
    VictoriaMetrics,
}

impl TargetFormat {
    /// Selects the format from a mode string.
    ///
    /// `victoriametrics` (any case) selects [`Self::VictoriaMetrics`], every
    /// other value selects [`Self::Prometheus`].
    #[must_use]
    pub fn from_mode(mode: &str) -> Self {
        match mode.trim().to_lowercase().as_str() {
            "victoriametrics" => Self::VictoriaMetrics,
            "" | "prometheus" => Self::Prometheus,
            other => {
                warn!(mode = %other, "unknown operator mode, using prometheus");
                Self::Prometheus
            }
        }
    }

    /// Returns the mode string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prometheus => "prometheus",
            Self::VictoriaMetrics => "victoriametrics",
        }
    }

    /// Returns the kind of the emitted documents.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Prometheus => PROMETHEUS_KIND,
            Self::VictoriaMetrics => VM_KIND,
        }
    }

    /// Emits the rule document for a source object.
    ///
    /// The document has the source's name and namespace and a controller
    /// owner reference to the source.
    #[must_use]
    pub fn emit(&self, source: &ServiceLevelObjective, groups: &[RuleGroup]) -> RuleDocument {
        let metadata = ObjectMeta {
            owner_references: vec![source.owner_reference()],
            ..ObjectMeta::new(
                source.metadata.namespace.clone(),
                source.metadata.name.clone(),
            )
        };

        match self {
            Self::Prometheus => RuleDocument::Prometheus(PrometheusRule {
                api_version: PROMETHEUS_API_VERSION.to_string(),
                metadata,
                spec: PrometheusRuleSpec {
                    groups: groups.iter().map(PrometheusRuleGroup::from).collect(),
                },
            }),
            Self::VictoriaMetrics => RuleDocument::VictoriaMetrics(VmRule {
                api_version: VM_API_VERSION.to_string(),
                metadata,
                spec: VmRuleSpec {
                    groups: groups.iter().map(VmRuleGroup::from).collect(),
                },
            }),
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Prometheus ============

/// A Prometheus Operator rule document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusRule {
    /// Always [`PROMETHEUS_API_VERSION`].
    pub api_version: String,
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Rule groups.
    pub spec: PrometheusRuleSpec,
}

/// Spec of a [`PrometheusRule`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrometheusRuleSpec {
    /// Rule groups in evaluation order.
    #[serde(default)]
    pub groups: Vec<PrometheusRuleGroup>,
}

/// A rule group of a [`PrometheusRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrometheusRuleGroup {
    /// Name of the group.
    pub name: String,
    /// Evaluation interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<RuleDuration>,
    /// Rules of the group.
    #[serde(default)]
    pub rules: Vec<PrometheusRuleEntry>,
}

/// A rule of a [`PrometheusRule`]. Exactly one of `record` and `alert` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrometheusRuleEntry {
    /// Name of the recorded series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    /// Name of the alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    /// Typed expression.
    pub expr: Expression,
    /// Pending duration of an alert.
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<RuleDuration>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl From<&RuleGroup> for PrometheusRuleGroup {
    fn from(group: &RuleGroup) -> Self {
        Self {
            name: group.name.clone(),
            interval: Some(group.interval.clone()),
            rules: group.rules.iter().map(PrometheusRuleEntry::from).collect(),
        }
    }
}

impl From<&Rule> for PrometheusRuleEntry {
    fn from(rule: &Rule) -> Self {
        match rule {
            Rule::Recording {
                record,
                expr,
                labels,
            } => Self {
                record: Some(record.clone()),
                alert: None,
                expr: expr.clone(),
                for_duration: None,
                labels: labels.clone(),
                annotations: BTreeMap::new(),
            },
            Rule::Alerting {
                alert,
                expr,
                for_duration,
                labels,
                annotations,
            } => Self {
                record: None,
                alert: Some(alert.clone()),
                expr: expr.clone(),
                for_duration: Some(for_duration.clone()),
                labels: labels.clone(),
                annotations: annotations.clone(),
            },
        }
    }
}

// ============ VictoriaMetrics ============

/// A VictoriaMetrics Operator rule document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmRule {
    /// Always [`VM_API_VERSION`].
    pub api_version: String,
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Rule groups.
    pub spec: VmRuleSpec,
}

/// Spec of a [`VmRule`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRuleSpec {
    /// Rule groups in evaluation order.
    #[serde(default)]
    pub groups: Vec<VmRuleGroup>,
}

/// A rule group of a [`VmRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRuleGroup {
    /// Name of the group.
    pub name: String,
    /// Evaluation interval.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interval: String,
    /// Rules of the group.
    #[serde(default)]
    pub rules: Vec<VmRuleEntry>,
}

/// A rule of a [`VmRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRuleEntry {
    /// Name of the recorded series.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub record: String,
    /// Name of the alert.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alert: String,
    /// Expression text.
    pub expr: String,
    /// Pending duration of an alert.
    #[serde(rename = "for", default, skip_serializing_if = "String::is_empty")]
    pub for_duration: String,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl From<&RuleGroup> for VmRuleGroup {
    fn from(group: &RuleGroup) -> Self {
        Self {
            name: group.name.clone(),
            interval: group.interval.to_string(),
            rules: group.rules.iter().map(VmRuleEntry::from).collect(),
        }
    }
}

impl From<&Rule> for VmRuleEntry {
    fn from(rule: &Rule) -> Self {
        let (record, alert, annotations) = match rule {
            Rule::Recording { record, .. } => (record.clone(), String::new(), BTreeMap::new()),
            Rule::Alerting {
                alert, annotations, ..
            } => (String::new(), alert.clone(), annotations.clone()),
        };

        Self {
            record,
            alert,
            expr: rule.expr().to_string(),
            for_duration: rule
                .for_duration()
                .map(ToString::to_string)
                .unwrap_or_default(),
            labels: rule.labels().clone(),
            annotations,
        }
    }
}

// ============ Document ============

/// Summary of one rule, independent of the wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSummary {
    /// Record or alert name.
    pub name: String,
    /// Expression text.
    pub expr: String,
    /// Pending duration text, if any.
    pub for_duration: Option<String>,
    /// Labels.
    pub labels: BTreeMap<String, String>,
}

/// A downstream rule document in either format, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RuleDocument {
    /// Format A.
    #[serde(rename = "PrometheusRule")]
    Prometheus(PrometheusRule),
    /// Format B.
    #[serde(rename = "VMRule")]
    VictoriaMetrics(VmRule),
}

impl RuleDocument {
    /// Returns the format of the document.
    #[must_use]
    pub const fn format(&self) -> TargetFormat {
        match self {
            Self::Prometheus(_) => TargetFormat::Prometheus,
            Self::VictoriaMetrics(_) => TargetFormat::VictoriaMetrics,
        }
    }

    /// Returns the metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Prometheus(rule) => &rule.metadata,
            Self::VictoriaMetrics(rule) => &rule.metadata,
        }
    }

    /// Returns the metadata for modification.
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Prometheus(rule) => &mut rule.metadata,
            Self::VictoriaMetrics(rule) => &mut rule.metadata,
        }
    }

    /// Returns the key of the document.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        self.metadata().key()
    }

    /// Returns true if both documents have the same format and rule groups.
    #[must_use]
    pub fn same_spec(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Prometheus(a), Self::Prometheus(b)) => a.spec == b.spec,
            (Self::VictoriaMetrics(a), Self::VictoriaMetrics(b)) => a.spec == b.spec,
            _ => false,
        }
    }

    /// Returns the group names in order.
    #[must_use]
    pub fn group_names(&self) -> Vec<&str> {
        match self {
            Self::Prometheus(rule) => rule.spec.groups.iter().map(|g| g.name.as_str()).collect(),
            Self::VictoriaMetrics(rule) => {
                rule.spec.groups.iter().map(|g| g.name.as_str()).collect()
            }
        }
    }

    /// Returns the total number of rules across all groups.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        match self {
            Self::Prometheus(rule) => rule.spec.groups.iter().map(|g| g.rules.len()).sum(),
            Self::VictoriaMetrics(rule) => rule.spec.groups.iter().map(|g| g.rules.len()).sum(),
        }
    }

    /// Returns a format-independent view of every rule, grouped.
    #[must_use]
    pub fn summarize(&self) -> Vec<(String, Vec<RuleSummary>)> {
        match self {
            Self::Prometheus(rule) => rule
                .spec
                .groups
                .iter()
                .map(|group| {
                    let rules = group
                        .rules
                        .iter()
                        .map(|r| RuleSummary {
                            name: r.record.clone().or_else(|| r.alert.clone()).unwrap_or_default(),
                            expr: r.expr.to_string(),
                            for_duration: r.for_duration.as_ref().map(ToString::to_string),
                            labels: r.labels.clone(),
                        })
                        .collect();
                    (group.name.clone(), rules)
                })
                .collect(),
            Self::VictoriaMetrics(rule) => rule
                .spec
                .groups
                .iter()
                .map(|group| {
                    let rules = group
                        .rules
                        .iter()
                        .map(|r| RuleSummary {
                            name: if r.record.is_empty() {
                                r.alert.clone()
                            } else {
                                r.record.clone()
                            },
                            expr: r.expr.clone(),
                            for_duration: (!r.for_duration.is_empty())
                                .then(|| r.for_duration.clone()),
                            labels: r.labels.clone(),
                        })
                        .collect();
                    (group.name.clone(), rules)
                })
                .collect(),
        }
    }
}
