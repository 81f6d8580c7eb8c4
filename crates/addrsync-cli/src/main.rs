//! addrsync CLI - Command-line interface for addrsync
//!
//! Provides commands for:
//! - Managing contact sources (CardDAV, Google, Microsoft)
//! - Syncing sources into the local contact database
//! - Probing CardDAV accounts
//! - Recipient autocomplete and send history

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod credentials;
mod output;

use addrsync_core::config::LoggingConfig;
use commands::{
    carddav::{DiscoverCommand, TestCommand},
    search::{ForgetCommand, RecordSentCommand, SearchCommand},
    source::SourceCommand,
    sync::SyncCommand,
    AppContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "addrsync", version, about = "Multi-source contact sync and recipient autocomplete")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage contact sources
    #[command(subcommand)]
    Source(SourceCommand),
    /// Synchronize contacts from enabled sources
    Sync(SyncCommand),
    /// List the addressbooks of a CardDAV account
    Discover(DiscoverCommand),
    /// Check CardDAV connectivity and credentials
    Test(TestCommand),
    /// Suggest recipients matching a query
    Search(SearchCommand),
    /// Record a recipient of outgoing mail
    RecordSent(RecordSentCommand),
    /// Remove a recipient from the send history
    Forget(ForgetCommand),
}

fn init_tracing(verbose: u8, logging: &LoggingConfig) {
    let level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref());
    init_tracing(cli.verbose, &config.logging);
    commands::report_config_problems(&config);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let ctx = AppContext::open(config).await?;

    match &cli.command {
        Commands::Source(cmd) => cmd.execute(&ctx, format, cli.quiet).await,
        Commands::Sync(cmd) => cmd.execute(&ctx, format, cli.quiet).await,
        Commands::Discover(cmd) => cmd.execute(&ctx, format, cli.quiet).await,
        Commands::Test(cmd) => cmd.execute(&ctx, format, cli.quiet).await,
        Commands::Search(cmd) => cmd.execute(&ctx, format, cli.quiet).await,
        Commands::RecordSent(cmd) => cmd.execute(&ctx, format, cli.quiet).await,
        Commands::Forget(cmd) => cmd.execute(&ctx, format, cli.quiet).await,
    }
}
