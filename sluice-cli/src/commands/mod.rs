//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;
mod reconcile;

pub use job::JobCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Ask the scheduler to run a reconciliation pass now
    Reconcile,
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Reconcile => reconcile::handle_reconcile(config).await,
    }
}
