use anyhow::{Context, Result};
use clap::Parser;
use fleetgate::config::FleetConfig;
use fleetgate::{FleetContext, PollingScheduler, ReconcileOutcome};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "fleetgate instance reconciliation daemon")]
struct Args {
    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the polling interval from the config file, in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval_secs: Option<u64>,

    /// Run one reconciliation pass, print the instance list as JSON, and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetgate=info,fleetgate_node=info".into()),
        )
        .init();

    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(FleetConfig::default_path);
    let config = FleetConfig::load(&config_path)?;
    let interval = args
        .interval_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.poll_interval());

    let ctx = FleetContext::from_config(&config, fleetgate_variants::BUILTIN_VARIANTS)
        .context("failed to set up controller session")?;
    tracing::info!(
        controller = %ctx.sessions().base_url(),
        variants = ctx.behaviors().len(),
        "fleetgate starting"
    );

    if args.once {
        return run_once(&ctx).await;
    }

    let scheduler = PollingScheduler::spawn(ctx.clone(), interval);
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("received SIGINT, shutting down");
    scheduler.stop().await;

    tracing::info!(instances = ctx.registry().len().await, "fleetgate shut down");
    Ok(())
}

async fn run_once(ctx: &FleetContext) -> Result<()> {
    match ctx.sync_fleet().await.context("fleet sync failed")? {
        ReconcileOutcome::EmptyFleet => {
            tracing::warn!("controller reported no instances");
        }
        ReconcileOutcome::Applied(report) => {
            tracing::info!(
                added = report.added.len(),
                excluded = report.excluded.len(),
                "fleet loaded"
            );
        }
    }
    ctx.registry().probe_liveness().await;
    let summaries = ctx.registry().summaries().await;
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_rejected() {
        let err = Args::try_parse_from(["fleetgate-node", "--interval-secs", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn positive_interval_is_accepted() {
        let args = Args::try_parse_from(["fleetgate-node", "--interval-secs", "15"]).unwrap();
        assert_eq!(args.interval_secs, Some(15));
        assert!(!args.once);
    }
}
