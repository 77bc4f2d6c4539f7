//! Main entry point for the tap-applovin CLI

use anyhow::Context;
use clap::Parser;
use tap_applovin::cli::error::{EXIT_CONFIG, EXIT_OK};
use tap_applovin::cli::{Cli, CliError};
use tap_applovin::metrics;
use tap_applovin::shutdown::{install_ctrl_c_handler, ShutdownCoordinator};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing on stderr; stdout carries the message stream
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tap_applovin=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(addr) = cli.metrics_addr {
        metrics::init_metrics(addr)
            .map_err(CliError::from)
            .context("failed to start metrics exporter")?;
    }

    let shutdown = ShutdownCoordinator::shared();
    install_ctrl_c_handler(shutdown.clone());

    cli.execute(shutdown).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and are not failures
            let code = if e.use_stderr() { EXIT_CONFIG } else { EXIT_OK };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = run(cli).await {
        error!("Command failed: {:#}", e);
        let code = e
            .downcast_ref::<CliError>()
            .map(CliError::exit_code)
            .unwrap_or(EXIT_CONFIG);
        std::process::exit(code);
    }
}
