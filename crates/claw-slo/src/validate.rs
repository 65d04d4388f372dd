//! SLO entry validation and normalization.

use crate::error::ValidationError;
use crate::types::Slo;

/// Placeholder that query templates use for the evaluation window.
pub const WINDOW_PLACEHOLDER: &str = "${window}";

/// Number of severities an alerting configuration must provide.
pub const SEVERITY_COUNT: usize = 5;

/// Severities used when the SLO does not provide exactly five.
pub const DEFAULT_SEVERITIES: [&str; SEVERITY_COUNT] =
    ["critical", "error", "error", "warning", "warning"];

/// Severities for the generated alerts.
///
/// Index 0 is used for the absent alert, indices 1 to 4 for the burn rate
/// alerts ordered from fastest to slowest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Severities([String; SEVERITY_COUNT]);

impl Severities {
    /// Returns the configured severities, or the defaults unless exactly
    /// five are given.
    #[must_use]
    pub fn from_config(configured: &[String]) -> Self {
        match <&[String; SEVERITY_COUNT]>::try_from(configured) {
            Ok(severities) => Self(severities.clone()),
            Err(_) => Self::default(),
        }
    }

    /// Returns the severity at `index`, clamped to the last entry.
    #[must_use]
    pub fn get(&self, index: usize) -> &str {
        &self.0[index.min(SEVERITY_COUNT - 1)]
    }

    /// Returns the severity of the absent alert.
    #[must_use]
    pub fn absent(&self) -> &str {
        self.get(0)
    }

    /// Returns all severities in order.
    #[must_use]
    pub const fn as_slice(&self) -> &[String; SEVERITY_COUNT] {
        &self.0
    }
}

impl Default for Severities {
    fn default() -> Self {
        Self(DEFAULT_SEVERITIES.map(str::to_string))
    }
}

/// An SLO entry that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSlo {
    /// Name of the SLO.
    pub name: String,
    /// Description of the SLO.
    pub description: String,
    /// Objective as a ratio in (0, 1].
    pub objective: f64,
    /// The same ratio as an exact minimal decimal, e.g. `0.999`.
    pub objective_ratio: String,
    /// Total query template.
    pub total_query: String,
    /// Error query template.
    pub error_query: String,
    /// Alert severities, `None` when alerting is disabled.
    pub severities: Option<Severities>,
}

impl NormalizedSlo {
    /// Returns true if alerting rules should be generated.
    #[must_use]
    pub const fn alerting_enabled(&self) -> bool {
        self.severities.is_some()
    }
}

/// Validates an SLO entry and normalizes it.
///
/// # Errors
///
/// - `ValidationError::MissingField` if name, objective or one of the
///   queries is empty
/// - `ValidationError::MissingPlaceholder` if a query lacks `${window}`
/// - `ValidationError::InvalidObjective` if the objective is not a number
///   in (0, 100]
pub fn validate(slo: &Slo) -> Result<NormalizedSlo, ValidationError> {
    if slo.name.is_empty()
        || slo.objective.is_empty()
        || slo.sli.total_query.is_empty()
        || slo.sli.error_query.is_empty()
    {
        return Err(ValidationError::MissingField);
    }

    if !slo.sli.total_query.contains(WINDOW_PLACEHOLDER)
        || !slo.sli.error_query.contains(WINDOW_PLACEHOLDER)
    {
        return Err(ValidationError::MissingPlaceholder);
    }

    let objective = parse_objective(&slo.objective)?;
    let objective_ratio =
        percent_to_ratio(&slo.objective).ok_or_else(|| ValidationError::InvalidObjective {
            reason: format!("{} is not a decimal number", slo.objective),
        })?;

    let severities =
        (!slo.alerting.disabled).then(|| Severities::from_config(&slo.alerting.severities));

    Ok(NormalizedSlo {
        name: slo.name.clone(),
        description: slo.description.clone(),
        objective,
        objective_ratio,
        total_query: slo.sli.total_query.clone(),
        error_query: slo.sli.error_query.clone(),
        severities,
    })
}

/// Parses a percentage string into a ratio.
fn parse_objective(objective: &str) -> Result<f64, ValidationError> {
    let percent: f64 = objective
        .parse()
        .map_err(|e: std::num::ParseFloatError| ValidationError::InvalidObjective {
            reason: e.to_string(),
        })?;

    if !percent.is_finite() || percent <= 0.0 || percent > 100.0 {
        return Err(ValidationError::InvalidObjective {
            reason: format!("{objective} is not within (0, 100]"),
        });
    }

    Ok(percent / 100.0)
}

/// Divides a decimal percentage string by 100 without rounding.
///
/// Moves the decimal point two places left and trims redundant zeros, so
/// `"99.9"` gives `"0.999"` and `"90"` gives `"0.9"`. Accepts the forms
/// `f64::from_str` accepts for finite numbers: an optional `+`, an optional
/// fraction and an optional exponent. Returns `None` for anything else.
fn percent_to_ratio(percent: &str) -> Option<String> {
    let unsigned = percent.strip_prefix('+').unwrap_or(percent);
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i64>().ok()?),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits = format!("{int_part}{frac_part}");
    let len = i64::try_from(digits.len()).ok()?;
    let point = i64::try_from(int_part.len()).ok()? + exponent - 2;

    let shifted = if point <= 0 {
        format!("0.{}{digits}", "0".repeat(usize::try_from(-point).ok()?))
    } else if point >= len {
        format!("{digits}{}", "0".repeat(usize::try_from(point - len).ok()?))
    } else {
        let split = usize::try_from(point).ok()?;
        format!("{}.{}", &digits[..split], &digits[split..])
    };

    let (whole, fraction) = shifted.split_once('.').unwrap_or((&shifted, ""));
    let whole = match whole.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    let fraction = fraction.trim_end_matches('0');

    Some(if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    })
}
