//! Corral fleet daemon.
//!
//! Loads the fleet configuration, builds the orchestrator over the
//! registered provisioning backends, and runs until interrupted. In dry-run
//! mode every configured backend type is served by the in-process simulated
//! backend, which is useful for exercising pool capacity and watchdog
//! behavior without a hypervisor.
//!
//! # Usage
//!
//! ```bash
//! # Run against the default configuration, simulated fleet
//! corrald --dry-run
//!
//! # Run with a configuration file
//! corrald --config /etc/corral/fleet.toml --dry-run
//!
//! # Print the effective default configuration and exit
//! corrald --print-config
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use corral_core::FleetConfig;
use corral_fleet::backend::ProvisioningBackend;
use corral_fleet::{FleetOrchestrator, SimulatedBackend};

/// CLI arguments for the corral daemon.
#[derive(Parser, Debug)]
#[command(
    name = "corrald",
    about = "Provisions and health-monitors a fleet of disposable test domains",
    version
)]
struct CliArgs {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serve every configured backend type with the simulated backend.
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON log output.
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

fn init_tracing(args: &CliArgs) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}

fn load_config(args: &CliArgs) -> Result<FleetConfig> {
    match &args.config {
        Some(path) => FleetConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(FleetConfig::default()),
    }
}

/// Builds the backend set for the configured backend types.
///
/// Only the simulated backend is registered in-process; real hypervisor
/// backends plug in through the same trait from their own crates.
fn registered_backends(config: &FleetConfig, dry_run: bool) -> Vec<Arc<dyn ProvisioningBackend>> {
    if !dry_run {
        return Vec::new();
    }

    config
        .backends
        .iter()
        .map(|section| {
            let backend = SimulatedBackend::new(section.backend_type.clone());
            for uri in &section.connections {
                for platform in &config.platforms {
                    backend.support(uri.clone(), platform.clone());
                }
            }
            Arc::new(backend) as Arc<dyn ProvisioningBackend>
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args)?;

    let config = load_config(&args)?;
    if args.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let backends = registered_backends(&config, args.dry_run);
    let orchestrator = match FleetOrchestrator::new(&config, backends).await {
        Ok(orchestrator) => Arc::new(orchestrator),
        Err(e) => {
            for violation in e.violations() {
                error!(%violation, "configuration rejected");
            }
            return Err(e).context("fleet configuration is invalid");
        }
    };

    orchestrator.start().await;
    info!(
        max_domains = config.fleet.max_domains,
        backends = config.backends.len(),
        dry_run = args.dry_run,
        "corrald running; press ctrl-c to stop"
    );

    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    orchestrator.stop().await;
    info!("fleet stopped");
    Ok(())
}
