//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod status;
mod watch;

use anyhow::Result;
use clap::Subcommand;
use crawlwatch_core::domain::job::{JobId, JobKind};

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Query a job's status once
    Status {
        /// Job kind (scrape, crawl, map, batch, search)
        kind: JobKind,
        /// Job ID
        id: JobId,
        /// Print the raw normalized update as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow a job until it finishes
    Watch {
        /// Job kind (scrape, crawl, map, batch, search)
        kind: JobKind,
        /// Job ID
        id: JobId,
        /// Print every snapshot as a JSON line
        #[arg(long)]
        json: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Status { kind, id, json } => status::show_status(config, kind, id, json).await,
        Commands::Watch { kind, id, json } => watch::watch_job(config, kind, id, json).await,
    }
}
