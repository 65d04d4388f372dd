//! Rule derivation for multiwindow multi-burn-rate alerting.
//!
//! [`derive`] turns one validated SLO into two rule groups:
//!
//! - `slo-generic-<id>` with the SLO window, objective, total and error
//!   series, the 28 day availability and (unless alerting is disabled) an
//!   alert for an absent total metric.
//! - `slo-errors-<id>` with one `slo:burnrate` series per window and (unless
//!   alerting is disabled) four `SLOErrorBudgetBurn` alerts, each pairing a
//!   short window with a long one. See
//!   <https://sre.google/workbook/alerting-on-slos/>.
//!
//! The error budget is `1 - objective`. A burn alert fires when both of its
//! windows consume the budget faster than `factor` times the sustainable rate.
//!
//! Derivation is pure: identical input yields identical output.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::labels::LabelSet;
use crate::types::{Expression, Rule, RuleDuration, RuleGroup};
use crate::validate::{NormalizedSlo, WINDOW_PLACEHOLDER};

/// SLO window in seconds. 28 days always span four weekends.
pub const SLO_WINDOW_SECONDS: i64 = 2_419_200;

/// Evaluation interval of every generated group.
pub const EVALUATION_INTERVAL: &str = "30s";

/// Window substituted into the total and error series.
pub const SERIES_WINDOW: &str = "2m";

/// Window substituted into the availability series.
pub const AVAILABILITY_WINDOW: &str = "28d";

/// How long the total metric must be absent before alerting.
pub const ABSENT_FOR: &str = "10m";

/// Windows for which a burn rate series is recorded.
pub const BURN_RATE_WINDOWS: [&str; 7] = ["5m", "30m", "1h", "2h", "6h", "1d", "4d"];

/// Recorded series names.
pub mod record {
    /// SLO window in seconds.
    pub const WINDOW: &str = "slo:window";
    /// Objective ratio.
    pub const OBJECTIVE: &str = "slo:objective";
    /// Total events.
    pub const TOTAL: &str = "slo:total";
    /// Failed events.
    pub const ERRORS_TOTAL: &str = "slo:errors_total";
    /// Availability over the SLO window.
    pub const AVAILABILITY: &str = "slo:availability";
    /// Error ratio per window.
    pub const BURN_RATE: &str = "slo:burnrate";
}

/// Generated alert names.
pub mod alert {
    /// The total metric is absent.
    pub const METRIC_ABSENT: &str = "SLOMetricAbsent";
    /// The error budget burns too fast.
    pub const ERROR_BUDGET_BURN: &str = "SLOErrorBudgetBurn";
}

/// One tier of the burn rate alert table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurnRateTier {
    /// Fast-reacting window.
    pub short_window: &'static str,
    /// Confirmation window.
    pub long_window: &'static str,
    /// Multiple of the sustainable burn rate.
    pub factor: u32,
    /// How long both windows must exceed the threshold.
    pub for_duration: &'static str,
    /// Index into the severities.
    pub severity_index: usize,
}

/// Burn rate alert tiers, from fastest to slowest.
pub const BURN_RATE_TIERS: [BurnRateTier; 4] = [
    BurnRateTier {
        short_window: "5m",
        long_window: "1h",
        factor: 14,
        for_duration: "2m",
        severity_index: 1,
    },
    BurnRateTier {
        short_window: "30m",
        long_window: "6h",
        factor: 7,
        for_duration: "15m",
        severity_index: 2,
    },
    BurnRateTier {
        short_window: "2h",
        long_window: "1d",
        factor: 2,
        for_duration: "1h",
        severity_index: 3,
    },
    BurnRateTier {
        short_window: "6h",
        long_window: "4d",
        factor: 1,
        for_duration: "3h",
        severity_index: 4,
    },
];

/// The two groups generated for one SLO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedGroups {
    /// Window, objective, series, availability and absent alert.
    pub generic: RuleGroup,
    /// Burn rate series and burn rate alerts.
    pub errors: RuleGroup,
}

impl DerivedGroups {
    /// Returns both groups in output order.
    #[must_use]
    pub fn into_vec(self) -> Vec<RuleGroup> {
        vec![self.generic, self.errors]
    }
}

/// Returns the unique id of an SLO: `<name>-<namespace>-<slo>`.
#[must_use]
pub fn slo_id(labels: &LabelSet, slo_name: &str) -> String {
    format!("{}-{}-{}", labels.name(), labels.namespace(), slo_name)
}

fn with_window(template: &str, window: &str) -> String {
    template.replace(WINDOW_PLACEHOLDER, window)
}

fn duration(literal: &str) -> Result<RuleDuration> {
    RuleDuration::parse(literal)
}

fn extend(labels: &BTreeMap<String, String>, key: &str, value: &str) -> BTreeMap<String, String> {
    let mut extended = labels.clone();
    extended.insert(key.to_string(), value.to_string());
    extended
}

fn recording(record: &str, expr: Expression, labels: BTreeMap<String, String>) -> Rule {
    Rule::Recording {
        record: record.to_string(),
        expr,
        labels,
    }
}

/// Derives the rule groups for one SLO.
///
/// # Errors
///
/// Returns `SloError::InvalidDuration` only if one of the built-in duration
/// constants is malformed.
pub fn derive(slo: &NormalizedSlo, labels: &LabelSet) -> Result<DerivedGroups> {
    let id = slo_id(labels, &slo.name);
    let objective = &slo.objective_ratio;

    let mut slo_labels = labels.as_map().clone();
    slo_labels.insert("id".to_string(), id.clone());
    slo_labels.insert("slo".to_string(), slo.name.clone());

    let mut generic_rules = vec![
        recording(record::WINDOW, Expression::Int(SLO_WINDOW_SECONDS), slo_labels.clone()),
        recording(
            record::OBJECTIVE,
            Expression::Query(objective.clone()),
            slo_labels.clone(),
        ),
        recording(
            record::TOTAL,
            Expression::Query(with_window(&slo.total_query, SERIES_WINDOW)),
            slo_labels.clone(),
        ),
        recording(
            record::ERRORS_TOTAL,
            Expression::Query(with_window(
                &format!("({}) or vector(0)", slo.error_query),
                SERIES_WINDOW,
            )),
            slo_labels.clone(),
        ),
        recording(
            record::AVAILABILITY,
            Expression::Query(with_window(
                &format!(
                    "1 - (({}) or vector(0)) / ({})",
                    slo.error_query, slo.total_query
                ),
                AVAILABILITY_WINDOW,
            )),
            slo_labels.clone(),
        ),
    ];

    let mut errors_rules: Vec<Rule> = BURN_RATE_WINDOWS
        .iter()
        .map(|window| burn_rate_recording(slo, &slo_labels, window))
        .collect();

    if let Some(severities) = &slo.severities {
        generic_rules.push(Rule::Alerting {
            alert: alert::METRIC_ABSENT.to_string(),
            expr: Expression::Query(with_window(
                &format!("absent({}) == 1", slo.total_query),
                SERIES_WINDOW,
            )),
            for_duration: duration(ABSENT_FOR)?,
            labels: extend(&slo_labels, "severity", severities.absent()),
            annotations: BTreeMap::new(),
        });

        for tier in &BURN_RATE_TIERS {
            errors_rules.push(Rule::Alerting {
                alert: alert::ERROR_BUDGET_BURN.to_string(),
                expr: Expression::Query(burn_rate_condition(&id, objective, tier)),
                for_duration: duration(tier.for_duration)?,
                labels: extend(&slo_labels, "severity", severities.get(tier.severity_index)),
                annotations: BTreeMap::new(),
            });
        }
    }

    let interval = duration(EVALUATION_INTERVAL)?;

    Ok(DerivedGroups {
        generic: RuleGroup {
            name: format!("slo-generic-{id}"),
            interval: interval.clone(),
            rules: generic_rules,
        },
        errors: RuleGroup {
            name: format!("slo-errors-{id}"),
            interval,
            rules: errors_rules,
        },
    })
}

fn burn_rate_recording(
    slo: &NormalizedSlo,
    labels: &BTreeMap<String, String>,
    window: &str,
) -> Rule {
    recording(
        record::BURN_RATE,
        Expression::Query(with_window(
            &format!("({}) / ({})", slo.error_query, slo.total_query),
            window,
        )),
        extend(labels, "window", window),
    )
}

fn burn_rate_condition(id: &str, objective: &str, tier: &BurnRateTier) -> String {
    format!(
        "{burnrate}{{window=\"{short}\", id=\"{id}\"}} > ({factor} * (1-{objective})) and \
         {burnrate}{{window=\"{long}\", id=\"{id}\"}} > ({factor} * (1-{objective}))",
        burnrate = record::BURN_RATE,
        short = tier.short_window,
        long = tier.long_window,
        factor = tier.factor,
    )
}
