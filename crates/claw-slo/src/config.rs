//! Process-wide operator configuration.
//!
//! The configuration is read once at startup and handed to the
//! [`Reconciler`](crate::Reconciler). Nothing in the crate reads the
//! environment on its own.

use crate::error::{Result, SloError};
use crate::labels::DEFAULT_LABEL_PREFIX;
use crate::target::TargetFormat;

/// Environment variable selecting the target format.
pub const MODE_ENV: &str = "SLO_OPERATOR_MODE";

/// Environment variable overriding the propagated label prefix.
pub const LABEL_PREFIX_ENV: &str = "SLO_OPERATOR_LABEL_PREFIX";

/// Configuration of the SLO operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Format of the generated rule documents.
    pub target: TargetFormat,
    /// Source labels with this prefix are copied onto every rule.
    pub label_prefix: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            target: TargetFormat::default(),
            label_prefix: DEFAULT_LABEL_PREFIX.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Creates a configuration for the given target format.
    #[must_use]
    pub fn new(target: TargetFormat) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Sets the label prefix.
    #[must_use]
    pub fn with_label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.label_prefix = prefix.into();
        self
    }

    /// Builds the configuration from a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `SloError::Config` if the resulting configuration is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let target = lookup(MODE_ENV)
            .map(|mode| TargetFormat::from_mode(&mode))
            .unwrap_or_default();
        let label_prefix =
            lookup(LABEL_PREFIX_ENV).unwrap_or_else(|| DEFAULT_LABEL_PREFIX.to_string());

        let config = Self {
            target,
            label_prefix,
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `SloError::Config` if the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SloError::Config` if the label prefix is empty or does not end
    /// with `/`.
    pub fn validate(&self) -> Result<()> {
        if self.label_prefix.is_empty() {
            return Err(SloError::Config("label prefix cannot be empty".to_string()));
        }
        if !self.label_prefix.ends_with('/') {
            return Err(SloError::Config(format!(
                "label prefix '{}' must end with '/'",
                self.label_prefix
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = OperatorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, OperatorConfig::default());
        assert_eq!(config.target, TargetFormat::Prometheus);
        assert_eq!(config.label_prefix, "slo.clawbernetes.io/");
    }

    #[test]
    fn victoriametrics_mode() {
        let config =
            OperatorConfig::from_lookup(lookup(&[("SLO_OPERATOR_MODE", "VictoriaMetrics")]))
                .unwrap();
        assert_eq!(config.target, TargetFormat::VictoriaMetrics);
    }

    #[test]
    fn custom_prefix() {
        let config =
            OperatorConfig::from_lookup(lookup(&[("SLO_OPERATOR_LABEL_PREFIX", "acme.io/")]))
                .unwrap();
        assert_eq!(config.label_prefix, "acme.io/");
    }

    #[test]
    fn rejects_bad_prefix() {
        let result =
            OperatorConfig::from_lookup(lookup(&[("SLO_OPERATOR_LABEL_PREFIX", "acme.io")]));
        assert!(matches!(result, Err(SloError::Config(_))));

        let empty = OperatorConfig::default().with_label_prefix("");
        assert!(empty.validate().is_err());
    }
}
