//! Subcommand implementations.
//!
//! - [`render`] prints the rule documents for a manifest without a store
//! - [`reconcile`] runs full passes against an [`InMemoryStore`]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use claw_slo::{
    Condition, InMemoryStore, ObjectKey, OperatorConfig, Phase, Reconciler, RuleDocument,
    RuleStore, SloError, SourceStore, generate,
};

use crate::manifest;

/// Renders the rule document of every object in a manifest.
///
/// Writes one pretty-printed JSON document per object.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded, an object has no SLOs
/// or fails validation, or writing fails.
pub fn render<W: Write>(config: &OperatorConfig, path: &Path, out: &mut W) -> anyhow::Result<()> {
    for source in manifest::load(path)? {
        if source.spec.slos.is_empty() {
            return Err(SloError::NoSlos).with_context(|| source.key().to_string());
        }
        let groups = generate(&source, &config.label_prefix)
            .with_context(|| format!("{}: invalid ServiceLevelObjective", source.key()))?;
        let document = config.target.emit(&source, &groups);

        serde_json::to_writer_pretty(&mut *out, &document)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Result of reconciling one object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileEntry {
    /// Key of the source object.
    pub key: ObjectKey,
    /// Terminal phase, or `error` if the pass returned an error.
    pub phase: String,
    /// Error returned by the pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Condition written to the source object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Rule document in the store after the pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<RuleDocument>,
}

impl ReconcileEntry {
    /// Returns true if the pass returned an error or ended in the failed
    /// phase, as an object without SLOs does.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.phase == Phase::Failed.as_str()
    }
}

/// Reconciles every object in the manifests, one task per object.
///
/// Objects are applied to a fresh store first, so a later manifest replaces
/// an earlier object with the same key. Writes a JSON array with one
/// [`ReconcileEntry`] per object and returns the entries.
///
/// # Errors
///
/// Returns an error if a manifest cannot be loaded, a task panics, or writing
/// fails. Failed passes are reported in the entries, not as errors.
pub async fn reconcile<W: Write>(
    config: &OperatorConfig,
    paths: &[PathBuf],
    out: &mut W,
) -> anyhow::Result<Vec<ReconcileEntry>> {
    let store = Arc::new(InMemoryStore::new());
    for path in paths {
        for source in manifest::load(path)? {
            store.apply_source(source);
        }
    }

    let reconciler = Reconciler::new(Arc::clone(&store), config.clone());
    let keys: Vec<ObjectKey> = store.list_sources().iter().map(|s| s.key()).collect();
    info!(objects = keys.len(), format = %config.target, "reconciling manifests");

    let handles: Vec<_> = keys
        .into_iter()
        .map(|key| {
            let reconciler = reconciler.clone();
            let handle = tokio::spawn({
                let key = key.clone();
                async move { reconciler.reconcile(&key).await }
            });
            (key, handle)
        })
        .collect();

    let mut entries = Vec::with_capacity(handles.len());
    for (key, handle) in handles {
        let result = handle
            .await
            .with_context(|| format!("reconcile task for {key} failed"))?;

        let (phase, error) = match result {
            Ok(Some(outcome)) => (outcome.phase.to_string(), None),
            Ok(None) => ("deleted".to_string(), None),
            Err(err) => {
                warn!(key = %key, error = %err, retryable = err.is_retryable(), "pass failed");
                ("error".to_string(), Some(err.to_string()))
            }
        };

        let condition = store
            .get_source(&key)
            .await?
            .and_then(|source| source.condition().cloned());
        let document = store.get_document(config.target, &key).await?;

        entries.push(ReconcileEntry {
            key,
            phase,
            error,
            condition,
            document,
        });
    }

    serde_json::to_writer_pretty(&mut *out, &entries)?;
    writeln!(out)?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_slo::{ConditionReason, TargetFormat};

    fn manifest(name: &str, objective: &str) -> String {
        format!(
            r#"{{
                "kind": "ServiceLevelObjective",
                "metadata": {{
                    "name": "{name}",
                    "namespace": "default",
                    "labels": {{"slo.clawbernetes.io/team": "payments"}}
                }},
                "spec": {{"slos": [{{
                    "name": "availability",
                    "objective": "{objective}",
                    "sli": {{
                        "totalQuery": "sum(rate(x[${{window}}]))",
                        "errorQuery": "sum(rate(x{{code=~\"5..\"}}[${{window}}]))"
                    }}
                }}]}}
            }}"#
        )
    }

    fn write_manifest(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    mod render_command {
        use super::*;

        #[test]
        fn prints_prometheus_rule() {
            let file = write_manifest(&manifest("api", "99.9"));
            let mut out = Vec::new();
            render(&OperatorConfig::default(), file.path(), &mut out).unwrap();

            let document: RuleDocument = serde_json::from_slice(&out).unwrap();
            assert_eq!(document.format(), TargetFormat::Prometheus);
            assert_eq!(document.rule_count(), 17);

            let text = String::from_utf8(out).unwrap();
            assert!(text.contains("\"kind\": \"PrometheusRule\""));
            assert!(text.contains("\"team\": \"payments\""));
        }

        #[test]
        fn prints_vmrule() {
            let file = write_manifest(&manifest("api", "99.9"));
            let mut out = Vec::new();
            let config = OperatorConfig::new(TargetFormat::VictoriaMetrics);
            render(&config, file.path(), &mut out).unwrap();

            let text = String::from_utf8(out).unwrap();
            assert!(text.contains("\"kind\": \"VMRule\""));
        }

        #[test]
        fn fails_on_invalid_objective() {
            let file = write_manifest(&manifest("api", "abc"));
            let err = render(&OperatorConfig::default(), file.path(), &mut Vec::new()).unwrap_err();
            assert!(format!("{err:#}").contains("failed to parse SLO objective"));
        }
    }

    mod reconcile_command {
        use super::*;

        #[tokio::test]
        async fn reports_every_object() {
            let good = write_manifest(&format!(
                "[{}, {}]",
                manifest("api", "99.9"),
                manifest("web", "99")
            ));
            let bad = write_manifest(&manifest("batch", "250"));
            let paths = vec![good.path().to_path_buf(), bad.path().to_path_buf()];

            let mut out = Vec::new();
            let entries = reconcile(&OperatorConfig::default(), &paths, &mut out)
                .await
                .unwrap();
            assert_eq!(entries.len(), 3);

            let failed: Vec<_> = entries.iter().filter(|e| e.failed()).collect();
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].key, ObjectKey::new("default", "batch"));
            assert!(failed[0].document.is_none());
            assert_eq!(
                failed[0].condition.as_ref().map(|c| c.reason),
                Some(ConditionReason::Failed)
            );

            for entry in entries.iter().filter(|e| !e.failed()) {
                assert_eq!(entry.phase, "succeeded");
                assert!(entry.document.is_some());
            }

            let printed: serde_json::Value = serde_json::from_slice(&out).unwrap();
            assert_eq!(printed.as_array().map(Vec::len), Some(3));
        }

        #[tokio::test]
        async fn empty_slo_list_counts_as_failed() {
            let empty = write_manifest(
                r#"{
                    "kind": "ServiceLevelObjective",
                    "metadata": {"name": "empty", "namespace": "default"},
                    "spec": {"slos": []}
                }"#,
            );
            let paths = vec![empty.path().to_path_buf()];

            let entries = reconcile(&OperatorConfig::default(), &paths, &mut Vec::new())
                .await
                .unwrap();
            assert_eq!(entries.len(), 1);
            assert!(entries[0].error.is_none());
            assert_eq!(entries[0].phase, "failed");
            assert!(entries[0].failed());
            assert!(entries[0].document.is_none());
            assert_eq!(
                entries[0].condition.as_ref().map(|c| c.reason),
                Some(ConditionReason::Failed)
            );
        }

        #[tokio::test]
        async fn later_manifest_wins() {
            let first = write_manifest(&manifest("api", "99"));
            let second = write_manifest(&manifest("api", "99.9"));
            let paths = vec![first.path().to_path_buf(), second.path().to_path_buf()];

            let entries = reconcile(&OperatorConfig::default(), &paths, &mut Vec::new())
                .await
                .unwrap();
            assert_eq!(entries.len(), 1);

            let text = serde_json::to_string(&entries[0].document).unwrap();
            assert!(text.contains("(1-0.999)"));
        }
    }
}
