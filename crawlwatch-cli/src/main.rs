//! Crawlwatch CLI
//!
//! Command-line interface for observing scraping jobs.

mod commands;
mod config;
mod display;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "crawlwatch")]
#[command(about = "Follow scrape, crawl, map, batch and search jobs", long_about = None)]
struct Cli {
    /// Base URL of the scraping API
    #[arg(long, env = "CRAWLWATCH_API_URL", default_value = "http://localhost:3002/v1")]
    api_url: String,

    /// API key used for status queries and event streams
    #[arg(long, env = "CRAWLWATCH_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so snapshots on stdout stay machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crawlwatch_cli=info,crawlwatch_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::new(cli.api_url, cli.api_key)?;

    handle_command(cli.command, &config).await
}
