//! One-shot status query

use anyhow::{Context, Result};
use colored::*;
use crawlwatch_core::domain::job::{JobId, JobKind};

use crate::config::Config;
use crate::display::{colorize_status, format_progress};

/// Fetch and print the current status of a job
pub async fn show_status(config: &Config, kind: JobKind, id: JobId, json: bool) -> Result<()> {
    let client = config.client()?;

    let update = client
        .fetch_status(&id, kind)
        .await
        .with_context(|| format!("Failed to fetch status of {} job {}", kind, id))?;

    if json {
        println!("{}", serde_json::to_string(&update)?);
        return Ok(());
    }

    let status = update.status.normalized();
    println!("{}", "Job Status:".bold());
    println!("  ID:       {}", id.to_string().cyan());
    println!("  Kind:     {}", kind);
    println!("  Status:   {}", colorize_status(status));
    println!(
        "  Progress: {}",
        format_progress(update.completed.unwrap_or(0), update.total.unwrap_or(0))
    );

    if let Some(error) = &update.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }

    Ok(())
}
