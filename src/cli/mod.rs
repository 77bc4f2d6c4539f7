//! CLI command implementations

pub mod discover;
pub mod error;
pub mod sync;
pub mod validate;

pub use discover::DiscoverCommand;
pub use error::CliError;
pub use sync::SyncCommand;
pub use validate::ValidateCommand;

use crate::config::{TapConfig, ValidatedConfig};
use crate::shutdown::SharedShutdown;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::Path;

/// Incremental extractor for AppLovin hourly reports
#[derive(Parser, Debug)]
#[command(name = "tap-applovin", version, about, long_about = None)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Maximum attempts per API call, overriding the config file (range: 1-20)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: Option<u32>,

    /// Serve Prometheus metrics on this address (e.g., 127.0.0.1:9090)
    #[arg(long, global = true, env = "TAP_APPLOVIN_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Show a progress bar over windows on stderr
    #[arg(long, global = true, default_value_t = false)]
    pub progress: bool,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract reports and write SCHEMA/RECORD/STATE messages to stdout
    Sync(SyncCommand),

    /// Print the stream catalog
    Discover(DiscoverCommand),

    /// Validate config and state, and print the planned windows
    Validate(ValidateCommand),
}

impl Cli {
    /// Run the selected command
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<(), CliError> {
        match &self.command {
            Commands::Sync(cmd) => cmd.execute(self, shutdown).await.map(|_| ()),
            Commands::Discover(cmd) => cmd.execute(self),
            Commands::Validate(cmd) => cmd.execute(self),
        }
    }

    /// Load and validate a config file, applying global overrides
    pub fn load_config(&self, path: &Path) -> Result<ValidatedConfig, CliError> {
        let config = TapConfig::from_path(path)?
            .with_max_attempts(self.max_attempts)
            .validate()?;
        Ok(config)
    }
}
