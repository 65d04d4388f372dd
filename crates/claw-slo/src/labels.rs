//! Label propagation from the source object to generated rules.

use std::collections::BTreeMap;

use crate::types::ServiceLevelObjective;

/// Default prefix marking source labels that are copied onto every rule.
pub const DEFAULT_LABEL_PREFIX: &str = "slo.clawbernetes.io/";

/// Label holding the source object's name.
pub const NAME_LABEL: &str = "name";

/// Label holding the source object's namespace.
pub const NAMESPACE_LABEL: &str = "namespace";

/// Labels shared by all rules generated for one source object.
///
/// Built once per pass and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Builds the label set for a source object.
    ///
    /// Every source label whose key starts with `prefix` is copied with the
    /// prefix stripped. `name` and `namespace` are always set from the source
    /// metadata and win over a prefixed label of the same key.
    #[must_use]
    pub fn from_source(source: &ServiceLevelObjective, prefix: &str) -> Self {
        let mut labels: BTreeMap<String, String> = source
            .metadata
            .labels
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(prefix)
                    .filter(|stripped| !stripped.is_empty())
                    .map(|stripped| (stripped.to_string(), value.clone()))
            })
            .collect();

        labels.insert(NAME_LABEL.to_string(), source.metadata.name.clone());
        labels.insert(NAMESPACE_LABEL.to_string(), source.metadata.namespace.clone());

        Self(labels)
    }

    /// Returns the value of a label.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the source object's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.get(NAME_LABEL).unwrap_or_default()
    }

    /// Returns the source object's namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.get(NAMESPACE_LABEL).unwrap_or_default()
    }

    /// Returns the labels as a map.
    #[must_use]
    pub const fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Returns the number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for LabelSet {
    fn from(labels: BTreeMap<String, String>) -> Self {
        Self(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_prefixed_labels_only() {
        let source = ServiceLevelObjective::new("default", "api")
            .with_label("slo.clawbernetes.io/team", "payments")
            .with_label("slo.clawbernetes.io/tier", "1")
            .with_label("app", "api")
            .with_label("example.com/slo.clawbernetes.io/x", "no");

        let labels = LabelSet::from_source(&source, DEFAULT_LABEL_PREFIX);

        assert_eq!(labels.get("team"), Some("payments"));
        assert_eq!(labels.get("tier"), Some("1"));
        assert_eq!(labels.get("app"), None);
        assert_eq!(labels.len(), 4);
    }

    #[test]
    fn injects_name_and_namespace() {
        let source = ServiceLevelObjective::new("monitoring", "checkout");
        let labels = LabelSet::from_source(&source, DEFAULT_LABEL_PREFIX);

        assert_eq!(labels.name(), "checkout");
        assert_eq!(labels.namespace(), "monitoring");
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn metadata_wins_over_prefixed_name() {
        let source = ServiceLevelObjective::new("default", "api")
            .with_label("slo.clawbernetes.io/name", "spoofed");
        let labels = LabelSet::from_source(&source, DEFAULT_LABEL_PREFIX);

        assert_eq!(labels.name(), "api");
    }

    #[test]
    fn bare_prefix_is_ignored() {
        let source =
            ServiceLevelObjective::new("default", "api").with_label("slo.clawbernetes.io/", "x");
        let labels = LabelSet::from_source(&source, DEFAULT_LABEL_PREFIX);

        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn custom_prefix() {
        let source = ServiceLevelObjective::new("default", "api")
            .with_label("acme.io/owner", "sre")
            .with_label("slo.clawbernetes.io/team", "payments");
        let labels = LabelSet::from_source(&source, "acme.io/");

        assert_eq!(labels.get("owner"), Some("sre"));
        assert_eq!(labels.get("team"), None);
    }
}
