//! Loading `ServiceLevelObjective` manifests from disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, bail};
use serde::Deserialize;
use tracing::debug;

use claw_slo::ServiceLevelObjective;
use claw_slo::types::KIND;

#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    Many(Vec<ServiceLevelObjective>),
    One(Box<ServiceLevelObjective>),
}

/// Parses a manifest holding one object or an array of objects.
///
/// # Errors
///
/// Returns an error if the text is not valid JSON for the expected shape, or
/// if an object has a kind other than `ServiceLevelObjective`.
pub fn parse(text: &str) -> anyhow::Result<Vec<ServiceLevelObjective>> {
    let objects = match serde_json::from_str::<Manifest>(text)
        .context("manifest is not a ServiceLevelObjective or an array of them")?
    {
        Manifest::Many(objects) => objects,
        Manifest::One(object) => vec![*object],
    };

    for object in &objects {
        if object.kind != KIND {
            bail!("{}: unexpected kind {}", object.key(), object.kind);
        }
        if object.metadata.name.is_empty() {
            bail!("object without metadata.name");
        }
    }

    Ok(objects)
}

/// Reads and parses a manifest file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load(path: &Path) -> anyhow::Result<Vec<ServiceLevelObjective>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let objects = parse(&text).with_context(|| format!("invalid manifest {}", path.display()))?;
    debug!(path = %path.display(), objects = objects.len(), "loaded manifest");
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ONE: &str = r#"{
        "apiVersion": "slo.clawbernetes.io/v1alpha1",
        "kind": "ServiceLevelObjective",
        "metadata": {"name": "api", "namespace": "default"},
        "spec": {"slos": []}
    }"#;

    #[test]
    fn single_object() {
        let objects = parse(ONE).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].metadata.name, "api");
    }

    #[test]
    fn array_of_objects() {
        let objects = parse(&format!("[{ONE}, {ONE}]")).unwrap();
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn rejects_other_kinds() {
        let text = ONE.replace("ServiceLevelObjective", "PrometheusRule");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("unexpected kind PrometheusRule"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("not json").is_err());
        assert!(parse(r#"{"spec": {}}"#).is_err());
    }

    #[test]
    fn load_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{").unwrap();

        let err = load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("invalid manifest"));

        let missing = load(Path::new("/nonexistent/slo.json")).unwrap_err();
        assert!(missing.to_string().contains("failed to read"));
    }
}
