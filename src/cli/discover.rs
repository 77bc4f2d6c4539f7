//! Discover command

use super::{Cli, CliError};
use crate::catalog::Catalog;
use crate::output::OutputError;
use clap::Parser;
use std::path::PathBuf;

/// Print the catalog of streams for a config
#[derive(Parser, Debug)]
pub struct DiscoverCommand {
    /// JSON config file
    #[arg(long)]
    pub config: PathBuf,
}

impl DiscoverCommand {
    /// Execute the discover command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.load_config(&self.config)?;
        let catalog = Catalog::for_columns(&config.endpoint.columns);
        let json = serde_json::to_string_pretty(&catalog)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;
        println!("{json}");
        Ok(())
    }
}
