use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Args, Subcommand};

use romcrush_core::ledger::JsonFileLedger;
use romcrush_core::{open_ledger, Config};

use super::Status;

#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub command: LedgerCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LedgerCommand {
    /// Show the recorded batch and its completed jobs
    Show,
    /// Forget all recorded progress
    Clear,
}

pub async fn execute(args: LedgerArgs, config: &Config) -> Result<ExitCode> {
    if !config.ledger.enabled {
        println!("Progress ledger is disabled in the configuration");
        return Ok(Status::Clean.into());
    }

    match args.command {
        LedgerCommand::Show => {
            let ledger = JsonFileLedger::open(&config.ledger.path);
            let snapshot = ledger.snapshot();
            println!("Ledger:    {}", ledger.path().display());
            match &snapshot.batch_id {
                Some(id) => println!("Batch:     {}", id),
                None => println!("Batch:     none"),
            }
            if let Some(dir) = &snapshot.source_dir {
                println!("Source:    {}", dir.display());
            }
            if snapshot.timestamp > 0.0 {
                let updated = Utc
                    .timestamp_millis_opt((snapshot.timestamp * 1000.0) as i64)
                    .single()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| snapshot.timestamp.to_string());
                println!("Updated:   {}", updated);
            }
            println!("Completed: {}", snapshot.completed_paths.len());
            for path in &snapshot.completed_paths {
                println!("  {}", path.display());
            }
        }
        LedgerCommand::Clear => {
            open_ledger(&config.ledger)
                .clear()
                .context("Failed to clear progress ledger")?;
            println!("Progress ledger cleared");
        }
    }
    Ok(Status::Clean.into())
}
