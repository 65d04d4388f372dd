//! SLO rule generation and convergence for Clawbernetes.
//!
//! `claw-slo` turns declarative `ServiceLevelObjective` objects into
//! monitoring rule documents using multiwindow multi-burn-rate alerting over a
//! 28 day window, and keeps those documents converged with their source.
//!
//! # Features
//!
//! - **Validation**: SLO entries are checked and normalized before use
//! - **Rule derivation**: Each SLO yields a recording group and an alerting group
//! - **Target formats**: Prometheus Operator `PrometheusRule` or VictoriaMetrics `VMRule`
//! - **Convergence**: One document per source, created or replaced as a whole
//! - **Status**: Every pass ends with a single condition on the source
//!
//! # Example
//!
//! ```rust
//! use claw_slo::{LabelSet, ServiceLevelObjective, Sli, Slo, TargetFormat, derive, validate};
//!
//! let source = ServiceLevelObjective::new("default", "checkout").with_slo(Slo {
//!     name: "availability".to_string(),
//!     objective: "99.9".to_string(),
//!     sli: Sli {
//!         total_query: "sum(rate(http_requests_total[${window}]))".to_string(),
//!         error_query: "sum(rate(http_requests_total{code=~\"5..\"}[${window}]))".to_string(),
//!     },
//!     ..Slo::default()
//! });
//!
//! let labels = LabelSet::from_source(&source, "slo.clawbernetes.io/");
//! let normalized = validate(&source.spec.slos[0]).unwrap();
//! let groups = derive(&normalized, &labels).unwrap().into_vec();
//!
//! let document = TargetFormat::Prometheus.emit(&source, &groups);
//! assert_eq!(document.group_names().len(), 2);
//! ```
//!
//! # Reconciliation
//!
//! ```rust
//! use std::sync::Arc;
//! use claw_slo::{InMemoryStore, OperatorConfig, Reconciler, ServiceLevelObjective};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let source = store.apply_source(ServiceLevelObjective::new("default", "checkout"));
//! let reconciler = Reconciler::new(Arc::clone(&store), OperatorConfig::default());
//! assert_eq!(reconciler.config().target, claw_slo::TargetFormat::Prometheus);
//! assert_eq!(source.metadata.generation, 1);
//! ```
//!
//! Passes are async. [`Reconciler::reconcile`] fetches the source by key and
//! returns `Ok(None)` once it has been deleted.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod labels;
pub mod reconciler;
pub mod rules;
pub mod status;
pub mod store;
pub mod target;
pub mod types;
pub mod validate;

pub use config::OperatorConfig;
pub use error::{Result, SloError, StoreError, ValidationError};
pub use labels::{DEFAULT_LABEL_PREFIX, LabelSet};
pub use reconciler::{Phase, ReconcileOutcome, Reconciler, SyncAction, generate, should_reconcile};
pub use rules::{DerivedGroups, derive};
pub use status::report;
pub use store::{InMemoryStore, RuleStore, SourceStore, StoreResult, WriteStats};
pub use target::{PrometheusRule, RuleDocument, TargetFormat, VmRule};
pub use types::{
    Alerting, Condition, ConditionReason, Expression, ObjectKey, ObjectMeta, OwnerReference, Rule,
    RuleDuration, RuleGroup, ServiceLevelObjective, ServiceLevelObjectiveSpec,
    ServiceLevelObjectiveStatus, Sli, Slo,
};
pub use validate::{NormalizedSlo, Severities, validate};
