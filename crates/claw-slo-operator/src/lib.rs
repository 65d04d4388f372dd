//! # claw-slo-operator
//!
//! Command-line front end for `claw-slo`.
//!
//! Provides commands for:
//! - Rendering the rule documents of `ServiceLevelObjective` manifests
//! - Reconciling manifests against an in-memory store
//!
//! The target format and label prefix come from flags or from the
//! `SLO_OPERATOR_MODE` and `SLO_OPERATOR_LABEL_PREFIX` environment variables.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod manifest;

pub use cli::{Cli, Commands};
pub use commands::ReconcileEntry;
