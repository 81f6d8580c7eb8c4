//! Sync command - Pull contacts from configured sources
//!
//! `addrsync sync` syncs every enabled source; `--source ID` syncs one.
//! Ctrl-C cancels the run without advancing any checkpoint that was in
//! flight.

use anyhow::Result;
use addrsync_sync::{SyncError, SyncReport};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::AppContext;
use crate::output::{get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Only sync this source
    #[arg(long)]
    pub source: Option<String>,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat, quiet: bool) -> Result<()> {
        let formatter = get_formatter(format, quiet);
        let orchestrator = ctx.orchestrator()?;

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, cancelling sync");
                on_interrupt.cancel();
            }
        });

        let result = match &self.source {
            Some(id) => {
                let source = ctx.source(id).await?;
                formatter.info(&format!("Syncing '{}'...", source.name()));
                orchestrator
                    .sync_source(source.id(), &cancel)
                    .await
                    .map(|report| vec![report])
            }
            None => {
                formatter.info("Syncing all enabled sources...");
                orchestrator.sync_all_sources(&cancel).await
            }
        };

        match result {
            Ok(reports) => {
                if format == OutputFormat::Json {
                    formatter.print_json(&serde_json::json!({ "reports": reports }));
                } else {
                    print_reports(formatter.as_ref(), &reports);
                }
                Ok(())
            }
            Err(SyncError::Cancelled) => {
                formatter.warn("Sync cancelled");
                Ok(())
            }
            Err(e) => {
                formatter.error(&e.to_string());
                if let SyncError::Partial { failures } = &e {
                    for failure in failures {
                        formatter.info(&format!("- {failure}"));
                    }
                }
                Err(e.into())
            }
        }
    }
}

fn print_reports(formatter: &dyn OutputFormatter, reports: &[SyncReport]) {
    if reports.is_empty() {
        formatter.success("No enabled sources");
        return;
    }

    for report in reports {
        if report.skipped {
            formatter.warn(&format!("'{}' is disabled, skipped", report.source_name));
            continue;
        }

        formatter.success(&format!(
            "'{}' synced in {}",
            report.source_name,
            format_duration(report.duration_ms)
        ));
        for book in &report.addressbooks {
            formatter.info(&format!(
                "{}: {} ({}), {} rows written, {} removed",
                book.path,
                if book.full_sync { "full" } else { "incremental" },
                plural(book.records, "contact"),
                book.written,
                book.deleted
            ));
        }
        if report.pruned_addressbooks > 0 {
            formatter.info(&format!(
                "Removed {} no longer on the server",
                plural(report.pruned_addressbooks as usize, "addressbook")
            ));
        }
    }
}

fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}
