//! Convergence of rule documents with their source objects.
//!
//! One pass of the [`Reconciler`] moves through these phases:
//!
//! ```text
//! NoSpec ──────────────────────────────┐
//!                                      v
//! Generating ──> Syncing ──> Succeeded | Failed
//! ```
//!
//! - **NoSpec**: the source has no SLOs. Nothing is generated, the status is
//!   set to `Failed` and no error is returned, so the object is not re-queued.
//! - **Generating**: every SLO is validated and derived in order. The first
//!   failing SLO aborts the pass before anything is written.
//! - **Syncing**: the rule document is created, or replaced as a whole if it
//!   exists, using the resource version of the fetched document.
//!
//! Every pass ends with exactly one status condition on the source. A pass
//! holds no state besides the configuration, so passes for different sources
//! may run in parallel. The caller must not run two passes for the same
//! source at once, and owns retries: a failed pass returns its error and is
//! re-delivered later. Dropping a pass mid-flight is safe since the next pass
//! recomputes and overwrites the whole document.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::OperatorConfig;
use crate::error::{Result, SloError};
use crate::labels::LabelSet;
use crate::rules::derive;
use crate::status::report;
use crate::store::{RuleStore, SourceStore};
use crate::types::{ObjectKey, RuleGroup, ServiceLevelObjective};
use crate::validate::validate;

/// Phase of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// The source has no SLOs.
    NoSpec,
    /// Rule groups are being derived.
    Generating,
    /// The rule document is being written.
    Syncing,
    /// The document was written.
    Succeeded,
    /// The pass was skipped or aborted.
    Failed,
}

impl Phase {
    /// Returns the phase as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoSpec => "no-spec",
            Self::Generating => "generating",
            Self::Syncing => "syncing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Returns true if the pass has ended.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write performed by the syncing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    /// A new document was created.
    Created,
    /// The existing document was replaced.
    Replaced,
}

/// Result of a pass that did not return an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Key of the source object.
    pub key: ObjectKey,
    /// Terminal phase of the pass.
    pub phase: Phase,
    /// Write performed, `None` if nothing was written.
    pub action: Option<SyncAction>,
    /// Number of rule groups in the document.
    pub groups: usize,
}

/// Returns true if a change from `old` to `new` needs a pass.
///
/// Only spec changes move the generation, so status writes made by the
/// reconciler itself do not trigger another pass.
#[must_use]
pub fn should_reconcile(old: &ServiceLevelObjective, new: &ServiceLevelObjective) -> bool {
    old.metadata.generation != new.metadata.generation
}

/// Derives the rule groups for every SLO of a source object.
///
/// # Errors
///
/// Returns the error of the first SLO that fails validation. No groups are
/// returned in that case, even for SLOs that passed.
pub fn generate(source: &ServiceLevelObjective, label_prefix: &str) -> Result<Vec<RuleGroup>> {
    let labels = LabelSet::from_source(source, label_prefix);
    let mut groups = Vec::with_capacity(source.spec.slos.len() * 2);

    for slo in &source.spec.slos {
        let normalized = validate(slo).map_err(|err| {
            debug!(slo = %slo.name, error = %err, "invalid slo");
            SloError::from(err)
        })?;
        let derived = derive(&normalized, &labels)?;
        debug!(
            slo = %normalized.name,
            generic = derived.generic.rules.len(),
            errors = derived.errors.rules.len(),
            "derived rule groups"
        );
        groups.extend(derived.into_vec());
    }

    Ok(groups)
}

/// Reconciles [`ServiceLevelObjective`]s into rule documents.
#[derive(Debug)]
pub struct Reconciler<S> {
    /// Store holding sources and documents.
    store: Arc<S>,
    /// Startup configuration.
    config: OperatorConfig,
}

impl<S> Clone for Reconciler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: SourceStore + RuleStore> Reconciler<S> {
    /// Creates a reconciler.
    #[must_use]
    pub const fn new(store: Arc<S>, config: OperatorConfig) -> Self {
        Self { store, config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Returns the store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fetches a source object and reconciles it.
    ///
    /// Returns `Ok(None)` if the source no longer exists. Its documents are
    /// removed by the platform through their owner reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails or the pass fails.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Option<ReconcileOutcome>> {
        info!(key = %key, "reconcile ServiceLevelObjective");

        let Some(source) = self.store.get_source(key).await? else {
            info!(key = %key, "ServiceLevelObjective not found, ignoring since it must be deleted");
            return Ok(None);
        };

        self.reconcile_object(source).await.map(Some)
    }

    /// Reconciles a fetched source object.
    ///
    /// # Errors
    ///
    /// Returns the validation or store error that aborted the pass. The same
    /// error is recorded in the source's status before returning. An empty
    /// SLO list is not an error.
    pub async fn reconcile_object(
        &self,
        mut source: ServiceLevelObjective,
    ) -> Result<ReconcileOutcome> {
        let key = source.key();

        if source.spec.slos.is_empty() {
            info!(key = %key, phase = %Phase::NoSpec, "no SLOs defined, skip reconciliation");
            report(self.store.as_ref(), &mut source, Some(&SloError::NoSlos)).await;
            return Ok(ReconcileOutcome {
                key,
                phase: Phase::Failed,
                action: None,
                groups: 0,
            });
        }

        debug!(
            key = %key,
            phase = %Phase::Generating,
            slos = source.spec.slos.len(),
            "generating rules"
        );
        let groups = match generate(&source, &self.config.label_prefix) {
            Ok(groups) => groups,
            Err(err) => return Err(self.fail(&mut source, err).await),
        };

        debug!(key = %key, phase = %Phase::Syncing, format = %self.config.target, "syncing rules");
        let action = match self.sync(&source, &groups).await {
            Ok(action) => action,
            Err(err) => return Err(self.fail(&mut source, err).await),
        };

        report(self.store.as_ref(), &mut source, None).await;
        info!(key = %key, action = ?action, groups = groups.len(), "reconciliation succeeded");

        Ok(ReconcileOutcome {
            key,
            phase: Phase::Succeeded,
            action: Some(action),
            groups: groups.len(),
        })
    }

    async fn fail(&self, source: &mut ServiceLevelObjective, err: SloError) -> SloError {
        report(self.store.as_ref(), source, Some(&err)).await;
        err
    }

    async fn sync(
        &self,
        source: &ServiceLevelObjective,
        groups: &[RuleGroup],
    ) -> Result<SyncAction> {
        let format = self.config.target;
        let key = source.key();
        let mut desired = format.emit(source, groups);

        match self.store.get_document(format, &key).await? {
            None => {
                info!(key = %key, kind = format.kind(), "creating rule document");
                self.store.create_document(desired).await?;
                Ok(SyncAction::Created)
            }
            Some(found) => {
                info!(key = %key, kind = format.kind(), "updating rule document");
                desired.metadata_mut().resource_version = found.metadata().resource_version.clone();
                self.store.replace_document(desired).await?;
                Ok(SyncAction::Replaced)
            }
        }
    }
}
