//! Validation subcommand

use super::{Cli, CliError};
use crate::resume::StateDocument;
use crate::window::WindowPlan;
use crate::REPORTS_STREAM;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;

/// Validate config and state file, then print the planned windows
#[derive(Parser, Debug)]
pub struct ValidateCommand {
    /// JSON config file
    #[arg(long)]
    pub config: PathBuf,

    /// State file to check and plan from
    #[arg(long)]
    pub state: Option<PathBuf>,
}

impl ValidateCommand {
    /// Execute the validation command; performs no network I/O
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.load_config(&self.config)?;
        println!("Config OK: {}", self.config.display());
        println!("  Endpoint: {}", config.endpoint.report_url());
        println!("  Report type: {}", config.endpoint.report_type);
        println!("  Columns: {}", config.endpoint.columns_param());
        println!("  Max attempts: {}", config.retry.max_attempts);

        let bookmark = match &self.state {
            Some(path) if path.exists() => {
                let document = StateDocument::load(path)?;
                let bookmark = document
                    .bookmark(REPORTS_STREAM)
                    .map(|b| b.replication_key);
                match bookmark {
                    Some(date) => println!("State OK: bookmark {date}"),
                    None => println!("State OK: no bookmark for '{REPORTS_STREAM}'"),
                }
                bookmark
            }
            Some(path) => {
                println!("No state file at {}; starting fresh", path.display());
                None
            }
            None => None,
        };

        let today = Utc::now().date_naive();
        let plan = WindowPlan::new(&config.planner, bookmark, today);
        if plan.is_empty() {
            println!("Plan: up to date, nothing to fetch");
            return Ok(());
        }

        println!(
            "Plan: {} window(s) covering [{}, {})",
            plan.len(),
            plan.start(),
            plan.end()
        );
        for window in &plan {
            println!("  {window}");
        }
        Ok(())
    }
}
