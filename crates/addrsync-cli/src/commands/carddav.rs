//! CardDAV account probing without storing a source
//!
//! - `addrsync discover URL USER` lists the addressbooks an account exposes
//! - `addrsync test URL USER` checks that the server accepts the credentials

use anyhow::Result;
use clap::Args;

use super::AppContext;
use crate::output::{get_formatter, plural, OutputFormat};

/// Server and credentials shared by `discover` and `test`
#[derive(Debug, Args)]
pub struct CardDavAccount {
    /// Server URL (root, principal or addressbook)
    pub url: String,

    /// Login name
    pub username: String,

    /// Password
    #[arg(long, env = "ADDRSYNC_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Args)]
pub struct DiscoverCommand {
    #[command(flatten)]
    pub account: CardDavAccount,
}

impl DiscoverCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat, quiet: bool) -> Result<()> {
        let formatter = get_formatter(format, quiet);
        let account = &self.account;

        let books = ctx
            .orchestrator()?
            .discover_addressbooks(&account.url, &account.username, &account.password)
            .await?;

        if format == OutputFormat::Json {
            formatter.print_json(&serde_json::to_value(&books)?);
            return Ok(());
        }

        formatter.success(&format!("Found {}", plural(books.len(), "addressbook")));
        for book in &books {
            formatter.row(&format!("{:<32} {}", book.display_name, book.path));
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct TestCommand {
    #[command(flatten)]
    pub account: CardDavAccount,
}

impl TestCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat, quiet: bool) -> Result<()> {
        let formatter = get_formatter(format, quiet);
        let account = &self.account;

        match ctx
            .orchestrator()?
            .test_connection(&account.url, &account.username, &account.password)
            .await
        {
            Ok(()) => {
                formatter.success(&format!("Connected to {} as {}", account.url, account.username));
                Ok(())
            }
            Err(e) => {
                formatter.error(&e.to_string());
                Err(e.into())
            }
        }
    }
}
