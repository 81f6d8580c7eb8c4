//! Source commands - Manage configured contact sources
//!
//! - `addrsync source add` registers a CardDAV, Google or Microsoft source
//!   and stores its secret in the keyring
//! - `addrsync source list` shows every source with its sync status
//! - `addrsync source remove` deletes a source with its addressbooks and contacts
//! - `addrsync source errors` shows sources whose last sync failed

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use addrsync_core::domain::{ContactSource, SourceType};
use addrsync_core::ports::IContactStore;
use clap::{Args, Subcommand};
use tracing::info;

use super::AppContext;
use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum SourceCommand {
    /// Register a new contact source
    Add(AddArgs),
    /// List configured sources
    List,
    /// Remove a source and everything synced from it
    Remove {
        /// Source ID
        id: String,
    },
    /// Show sources whose last sync failed
    Errors,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Display name
    pub name: String,

    /// Provider: carddav, google or microsoft
    #[arg(long = "type", default_value = "carddav")]
    pub source_type: String,

    /// CardDAV server URL
    #[arg(long)]
    pub url: Option<String>,

    /// CardDAV login name
    #[arg(long)]
    pub username: Option<String>,

    /// CardDAV password, stored in the system keyring
    #[arg(long, env = "ADDRSYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Email account an OAuth source is linked to
    #[arg(long)]
    pub account: Option<String>,

    /// Current OAuth access token, stored in the system keyring
    #[arg(long, env = "ADDRSYNC_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Minutes between scheduled syncs (0 = manual only)
    #[arg(long, default_value_t = 0)]
    pub interval: u32,

    /// Register the source disabled
    #[arg(long)]
    pub disabled: bool,
}

impl SourceCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat, quiet: bool) -> Result<()> {
        match self {
            SourceCommand::Add(args) => add(ctx, args, format, quiet).await,
            SourceCommand::List => list(ctx, format, quiet, false).await,
            SourceCommand::Errors => list(ctx, format, quiet, true).await,
            SourceCommand::Remove { id } => remove(ctx, id, format, quiet).await,
        }
    }
}

async fn add(ctx: &AppContext, args: &AddArgs, format: OutputFormat, quiet: bool) -> Result<()> {
    let formatter = get_formatter(format, quiet);
    let source_type = SourceType::from_str(&args.source_type)?;

    let mut source = match source_type {
        SourceType::CardDav => {
            let (Some(url), Some(username)) = (&args.url, &args.username) else {
                bail!("CardDAV sources need --url and --username");
            };
            ContactSource::carddav(&args.name, url, username)
        }
        SourceType::Google | SourceType::Microsoft => {
            ContactSource::oauth(&args.name, source_type, args.account.clone())
        }
    };
    source.set_enabled(!args.disabled);
    source.set_sync_interval_minutes(args.interval);

    ctx.store
        .create_source(&source)
        .await
        .context("Failed to create source")?;
    info!(source_id = %source.id(), source_type = %source_type, "Source created");

    let id = source.id().to_string();
    match source_type {
        SourceType::CardDav => match &args.password {
            Some(password) => ctx.credentials.save_carddav_password(&id, password)?,
            None => formatter.warn("No password given; sync will fail until one is stored"),
        },
        SourceType::Google | SourceType::Microsoft => match &args.access_token {
            Some(token) => ctx
                .credentials
                .save_access_token(&source.credential_owner(), token)?,
            None => formatter.warn(&format!(
                "No access token given; store one for '{}' before syncing",
                source.credential_owner()
            )),
        },
    }

    if format == OutputFormat::Json {
        formatter.print_json(&serde_json::to_value(&source)?);
    } else {
        formatter.success(&format!("Added {} source '{}'", source_type, source.name()));
        formatter.info(&format!("ID: {id}"));
    }
    Ok(())
}

async fn list(ctx: &AppContext, format: OutputFormat, quiet: bool, errors_only: bool) -> Result<()> {
    let formatter = get_formatter(format, quiet);
    let sources = if errors_only {
        ctx.store.list_source_errors().await?
    } else {
        ctx.store.list_sources().await?
    };

    if format == OutputFormat::Json {
        formatter.print_json(&serde_json::to_value(&sources)?);
        return Ok(());
    }

    if sources.is_empty() {
        formatter.success(if errors_only {
            "No source has a sync error"
        } else {
            "No sources configured. Add one with 'addrsync source add'."
        });
        return Ok(());
    }

    formatter.success(&plural(sources.len(), "source"));
    for source in &sources {
        let status = match (source.last_error(), source.last_synced_at()) {
            (Some(err), _) => format!("error: {err}"),
            (None, Some(at)) => format!("synced {}", at.format("%Y-%m-%d %H:%M")),
            (None, None) => "never synced".to_string(),
        };
        formatter.row(&format!(
            "{}  {:<10} {:<24} {}{}",
            source.id(),
            source.source_type(),
            source.name(),
            if source.is_enabled() { "" } else { "[disabled] " },
            status
        ));
    }
    Ok(())
}

async fn remove(ctx: &AppContext, id: &str, format: OutputFormat, quiet: bool) -> Result<()> {
    let formatter = get_formatter(format, quiet);
    let source = ctx.source(id).await?;

    ctx.store.delete_source(source.id()).await?;
    ctx.credentials
        .forget_source(&source.id().to_string(), &source.credential_owner())?;

    formatter.success(&format!("Removed source '{}'", source.name()));
    Ok(())
}
