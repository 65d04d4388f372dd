//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use claw_slo::config::{LABEL_PREFIX_ENV, MODE_ENV};
use claw_slo::{DEFAULT_LABEL_PREFIX, OperatorConfig, TargetFormat};

/// Clawbernetes SLO operator.
#[derive(Parser, Debug, Clone)]
#[command(name = "claw-slo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Target rule format, `prometheus` or `victoriametrics`.
    #[arg(short, long, env = MODE_ENV, default_value = "prometheus")]
    pub mode: String,

    /// Source labels with this prefix are copied onto every generated rule.
    #[arg(long, env = LABEL_PREFIX_ENV, default_value = DEFAULT_LABEL_PREFIX)]
    pub label_prefix: String,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Builds the operator configuration from the parsed flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the label prefix is invalid.
    pub fn config(&self) -> claw_slo::Result<OperatorConfig> {
        let config = OperatorConfig::new(TargetFormat::from_mode(&self.mode))
            .with_label_prefix(self.label_prefix.clone());
        config.validate()?;
        Ok(config)
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the rule document generated for each object of a manifest.
    Render {
        /// JSON file holding one `ServiceLevelObjective` or an array of them.
        manifest: PathBuf,
    },

    /// Reconcile manifests against an in-memory store and print the result.
    ///
    /// Every object is reconciled on its own task. Exits non-zero if any
    /// pass failed.
    Reconcile {
        /// JSON files holding `ServiceLevelObjective` objects.
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
    },
}
