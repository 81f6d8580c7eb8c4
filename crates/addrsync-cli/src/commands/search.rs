//! Autocomplete commands
//!
//! - `addrsync search QUERY` prints ranked recipient suggestions
//! - `addrsync record-sent EMAIL` learns a recipient from outgoing mail
//! - `addrsync forget EMAIL` removes a learned recipient

use anyhow::Result;
use clap::Args;

use super::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct SearchCommand {
    /// Text matched against addresses and names
    pub query: String,

    /// Maximum number of suggestions
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

impl SearchCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat, quiet: bool) -> Result<()> {
        let formatter = get_formatter(format, quiet);
        let suggestions = ctx.autocomplete().search(&self.query, self.limit).await?;

        if format == OutputFormat::Json {
            formatter.print_json(&serde_json::to_value(&suggestions)?);
            return Ok(());
        }

        if suggestions.is_empty() {
            formatter.info("No matches");
        }
        for s in &suggestions {
            let name = if s.display_name.is_empty() {
                String::new()
            } else {
                format!("{} ", s.display_name)
            };
            formatter.row(&format!("{name}<{}>  [{}, sent {}]", s.email, s.source, s.send_count));
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct RecordSentCommand {
    /// Recipient address
    pub email: String,

    /// Recipient name as written in the message
    #[arg(long, default_value = "")]
    pub name: String,
}

impl RecordSentCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat, quiet: bool) -> Result<()> {
        let formatter = get_formatter(format, quiet);
        let contact = ctx.autocomplete().record_sent(&self.email, &self.name).await?;

        if format == OutputFormat::Json {
            formatter.print_json(&serde_json::to_value(&contact)?);
        } else {
            formatter.success(&format!(
                "Recorded {} (sent {} times)",
                contact.email, contact.send_count
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct ForgetCommand {
    /// Recipient address
    pub email: String,
}

impl ForgetCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat, quiet: bool) -> Result<()> {
        let formatter = get_formatter(format, quiet);
        if ctx.autocomplete().forget(&self.email).await? {
            formatter.success(&format!("Forgot {}", self.email));
        } else {
            formatter.warn(&format!("{} was not in the send history", self.email));
        }
        Ok(())
    }
}
