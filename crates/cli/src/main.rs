mod commands;
mod metrics;
mod observer;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use commands::{Cli, Status};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Status::Fatal.into()
        }
    }
}
