mod cli;
mod compiler;
mod config;
mod deploy;
mod error;
mod golden;
mod health;
mod inventory;
mod models;
mod pipeline;
mod render;
mod session;
mod store;
mod utils;

use anyhow::bail;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Action, Cli};
use config::Config;
use error::PipelineError;
use health::ProbePlan;
use pipeline::{Pipeline, RunSummary};
use session::SshSessionFactory;
use store::MergePolicy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so RUST_LOG and pipeline settings can come from it
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "topology_forge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let cli = Cli::parse();
    let action = cli.action.as_deref().map(str::parse::<Action>).transpose()?;

    // Load configuration
    let mut cfg = Config::load();
    if let Some(csv) = &cli.csv {
        cfg.requirements_csv = csv.clone();
    }
    tracing::info!("Requirements: {}", cfg.requirements_csv.display());
    tracing::info!("Candidate dir: {}", cfg.candidate_dir.display());
    tracing::info!("Golden dir: {}", cfg.golden_dir.display());

    let cancel = CancellationToken::new();
    tokio::spawn(interrupt_watcher(cancel.clone()));

    let pipeline = Pipeline::new(cfg, Arc::new(SshSessionFactory));

    let summary = match action {
        None => {
            tracing::info!("Running full pipeline");
            let report = pipeline.full(&cancel).await?;
            RunSummary::from_report("pipeline", &report)
        }
        Some(action) => {
            tracing::info!("Running action: {}", action);
            run_action(&pipeline, action, &cli, &cancel).await?
        }
    };

    print_summary(&summary, cli.json)?;

    if summary.rollback.is_some() {
        bail!("Verification failed; devices were rolled back to their golden configs");
    }
    Ok(())
}

async fn run_action(
    pipeline: &Pipeline,
    action: Action,
    cli: &Cli,
    cancel: &CancellationToken,
) -> anyhow::Result<RunSummary> {
    let name = action.as_str();
    let summary = match action {
        Action::TopologyConfig => RunSummary::from_report(name, &pipeline.topology_config(cancel).await?),
        Action::RollbackConfig => RunSummary::from_report(name, &pipeline.rollback_config(cancel).await?),
        Action::GoldenPull => {
            let (files, timestamp) = pipeline.golden_pull(cancel).await?;
            tracing::info!("Golden generation {}: {} files", timestamp, files.len());
            RunSummary {
                action: name.to_string(),
                succeeded: files.len(),
                files,
                ..Default::default()
            }
        }
        Action::Merge => {
            let rows = cli
                .rows
                .as_deref()
                .ok_or_else(|| PipelineError::InvalidArgument("merge requires --rows".into()))?;
            let policy: MergePolicy = cli.policy.parse()?;
            let applied = pipeline.merge(rows, policy)?;
            RunSummary {
                action: name.to_string(),
                succeeded: applied.len(),
                files: applied
                    .into_iter()
                    .map(|(hostname, total)| format!("{} merged ({} rows in store)", hostname, total))
                    .collect(),
                ..Default::default()
            }
        }
        Action::VerifiedConfig => {
            let run = pipeline.verified_config(&cli.ping, cancel).await?;
            if !run.passed() {
                tracing::error!("Post-deployment verification failed");
            }
            RunSummary::from_verified(name, &run)
        }
        Action::HealthCheck => {
            let plan = ProbePlan {
                ping_targets: cli.ping.clone(),
                bgp_neighbors: cli.bgp,
                route_term: cli.route.clone(),
            };
            if plan.is_empty() {
                return Err(PipelineError::InvalidArgument(
                    "health_check needs --ping, --bgp or --route".into(),
                )
                .into());
            }
            let probes = pipeline.health_check(&plan, cancel).await?;
            RunSummary {
                action: name.to_string(),
                succeeded: probes.iter().filter(|p| p.passed).count(),
                failed: probes.iter().filter(|p| !p.passed).count(),
                probes,
                ..Default::default()
            }
        }
    };
    Ok(summary)
}

fn print_summary(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print!("{}", summary.to_table());
    }
    Ok(())
}

/// Cancel outstanding device work on the first Ctrl+C, exit on the second
async fn interrupt_watcher(cancel: CancellationToken) {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        return;
    }
    tracing::warn!("Interrupt received, not starting further devices (Ctrl+C again to abort)");
    cancel.cancel();

    if signal::ctrl_c().await.is_ok() {
        tracing::error!("Second interrupt received, aborting");
        std::process::exit(130);
    }
}
