//! SLO operator binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use claw_slo_operator::cli::{Cli, Commands};
use claw_slo_operator::commands;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.config()?;
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Commands::Render { manifest } => {
            commands::render(&config, manifest, &mut stdout)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reconcile { manifests } => {
            let entries = commands::reconcile(&config, manifests, &mut stdout).await?;
            if entries.iter().any(claw_slo_operator::ReconcileEntry::failed) {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}
