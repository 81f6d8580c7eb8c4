//! Sync orchestrator
//!
//! The single place that decides retry vs fallback vs propagate, and the
//! single writer of a source's user-visible status.
//!
//! ## Sync cycle for one source
//!
//! 1. Serialize on the source's lock
//! 2. Load and validate the source (disabled sources are skipped)
//! 3. CardDAV: discover addressbooks, register them, prune vanished ones.
//!    OAuth: use the virtual addressbook `"/"`.
//! 4. Per addressbook: fetch a [`RemoteContactBatch`], then either replace
//!    the whole contact set (full) or delete + upsert (incremental), then
//!    store the new checkpoint
//! 5. Record success or the aggregated failure on the source

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use addrsync_core::config::Config;
use addrsync_core::domain::{
    Addressbook, ContactSource, DiscoveredAddressbook, SourceId, SourceType,
    VIRTUAL_ADDRESSBOOK_PATH,
};
use addrsync_core::ports::{
    IContactProvider, IContactStore, ICredentialProvider, IProviderFactory, RemoteContactBatch,
};
use futures_util::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::lock::SourceLocks;
use crate::retry::{with_retry, RetryPolicy};
use crate::SyncError;

// ============================================================================
// Settings and reports
// ============================================================================

/// Orchestrator tuning
#[derive(Debug, Clone, Default)]
pub struct SyncSettings {
    /// Backoff for busy store writes
    pub retry: RetryPolicy,
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

/// Outcome of syncing one addressbook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressbookReport {
    pub path: String,
    pub full_sync: bool,
    /// Distinct remote records received
    pub records: usize,
    /// Rows written
    pub written: usize,
    /// Rows skipped as unstorable
    pub skipped: usize,
    /// Rows removed by incremental deletions
    pub deleted: u64,
}

/// Outcome of syncing one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub source_id: SourceId,
    pub source_name: String,
    /// True when the source is disabled and nothing was done
    pub skipped: bool,
    pub addressbooks: Vec<AddressbookReport>,
    /// Local addressbooks removed because the server no longer lists them
    pub pruned_addressbooks: u64,
    /// Per-addressbook failure messages
    pub failures: Vec<String>,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(source: &ContactSource) -> Self {
        Self {
            source_id: *source.id(),
            source_name: source.name().to_string(),
            skipped: false,
            addressbooks: Vec::new(),
            pruned_addressbooks: 0,
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Report for a disabled source
    pub fn skipped(source: &ContactSource) -> Self {
        Self {
            skipped: true,
            ..Self::new(source)
        }
    }

    /// Rows written across all addressbooks
    pub fn rows_written(&self) -> usize {
        self.addressbooks.iter().map(|a| a.written).sum()
    }
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Coordinates protocol clients and the contact store
///
/// ## Dependencies
///
/// - `store`: sources, addressbooks and synced contacts
/// - `providers`: builds a protocol client per source
/// - `credentials`: CardDAV passwords and OAuth access tokens
pub struct SyncOrchestrator {
    store: Arc<dyn IContactStore>,
    providers: Arc<dyn IProviderFactory>,
    credentials: Arc<dyn ICredentialProvider>,
    settings: SyncSettings,
    locks: SourceLocks,
}

impl SyncOrchestrator {
    /// Creates a new orchestrator with the given collaborators
    pub fn new(
        store: Arc<dyn IContactStore>,
        providers: Arc<dyn IProviderFactory>,
        credentials: Arc<dyn ICredentialProvider>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            providers,
            credentials,
            settings,
            locks: SourceLocks::new(),
        }
    }

    /// Synchronizes one source
    ///
    /// # Errors
    /// - [`SyncError::SourceNotFound`] / [`SyncError::Configuration`]: nothing attempted or recorded
    /// - [`SyncError::Cancelled`]: no checkpoint advanced for the interrupted addressbook
    /// - [`SyncError::Partial`]: some addressbooks failed; the others were synced
    /// - anything else: recorded on the source and returned
    #[tracing::instrument(skip(self, cancel), fields(source_id = %id))]
    pub async fn sync_source(
        &self,
        id: &SourceId,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            guard = self.locks.acquire(id) => guard,
        };

        let source = self
            .store
            .get_source(id)
            .await
            .map_err(SyncError::store)?
            .ok_or(SyncError::SourceNotFound(*id))?;

        if !source.is_enabled() {
            info!(name = source.name(), "Source disabled, skipping");
            return Ok(SyncReport::skipped(&source));
        }

        source
            .validate()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        info!(
            name = source.name(),
            source_type = %source.source_type(),
            "Starting source sync"
        );
        let start = Instant::now();

        let outcome = match source.source_type() {
            SourceType::CardDav => self.sync_carddav(&source, cancel).await,
            SourceType::Google | SourceType::Microsoft => self.sync_oauth(&source, cancel).await,
        };

        let outcome = outcome.map(|mut report| {
            report.duration_ms = start.elapsed().as_millis() as u64;
            report
        });
        self.finish(&source, outcome).await
    }

    /// Synchronizes every enabled source concurrently
    ///
    /// A failing source never prevents the others from running; failures
    /// are aggregated into [`SyncError::Partial`].
    #[tracing::instrument(skip(self, cancel))]
    pub async fn sync_all_sources(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<SyncReport>, SyncError> {
        let sources: Vec<ContactSource> = self
            .store
            .list_sources()
            .await
            .map_err(SyncError::store)?
            .into_iter()
            .filter(ContactSource::is_enabled)
            .collect();

        info!(count = sources.len(), "Syncing all enabled sources");

        let results = join_all(sources.iter().map(|s| self.sync_source(s.id(), cancel))).await;

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for (source, result) in sources.iter().zip(results) {
            match result {
                Ok(report) => reports.push(report),
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => failures.push(format!("{} ({}): {e}", source.name(), source.id())),
            }
        }

        if failures.is_empty() {
            Ok(reports)
        } else {
            warn!(failed = failures.len(), succeeded = reports.len(), "Some sources failed");
            Err(SyncError::Partial { failures })
        }
    }

    /// Lists the addressbooks a CardDAV account exposes, without storing anything
    #[tracing::instrument(skip(self, password))]
    pub async fn discover_addressbooks(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<DiscoveredAddressbook>, SyncError> {
        let client = self
            .providers
            .carddav(url, username, password)
            .map_err(|e| SyncError::Configuration(format!("{e:#}")))?;
        client
            .discover_addressbooks()
            .await
            .map_err(SyncError::provider)
    }

    /// Checks that a CardDAV server answers and accepts the credentials
    #[tracing::instrument(skip(self, password))]
    pub async fn test_connection(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<(), SyncError> {
        let client = self
            .providers
            .carddav(url, username, password)
            .map_err(|e| SyncError::Configuration(format!("{e:#}")))?;
        client.test_connection().await.map_err(SyncError::provider)
    }

    // ========================================================================
    // Per-type handlers
    // ========================================================================

    async fn sync_carddav(
        &self,
        source: &ContactSource,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let password = self
            .credentials
            .carddav_password(&source.id().to_string())
            .await
            .map_err(SyncError::credentials)?;

        let client = self
            .providers
            .carddav(
                source.url().unwrap_or_default(),
                source.username().unwrap_or_default(),
                &password,
            )
            .map_err(|e| SyncError::Configuration(format!("{e:#}")))?;

        let discovered = cancellable(cancel, client.discover_addressbooks())
            .await?
            .map_err(SyncError::provider)?;

        let mut addressbooks = Vec::with_capacity(discovered.len());
        for found in &discovered {
            let addressbook = self
                .write("upsert_addressbook", || {
                    self.store
                        .upsert_addressbook(source.id(), &found.path, &found.display_name)
                })
                .await?;
            addressbooks.push(addressbook);
        }

        let keep: Vec<String> = discovered.iter().map(|d| d.path.clone()).collect();
        let mut report = SyncReport::new(source);
        report.pruned_addressbooks = self
            .write("prune_addressbooks", || {
                self.store.prune_addressbooks(source.id(), &keep)
            })
            .await?;
        if report.pruned_addressbooks > 0 {
            info!(pruned = report.pruned_addressbooks, "Removed vanished addressbooks");
        }

        for addressbook in &addressbooks {
            match self
                .sync_addressbook(client.as_ref(), addressbook, cancel)
                .await
            {
                Ok(ab_report) => report.addressbooks.push(ab_report),
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    warn!(addressbook = %addressbook.path, error = %e, "Addressbook sync failed");
                    report.failures.push(format!("{}: {e}", addressbook.path));
                }
            }
        }

        Ok(report)
    }

    async fn sync_oauth(
        &self,
        source: &ContactSource,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let owner = source.credential_owner();
        let token = self
            .credentials
            .access_token(&owner)
            .await
            .map_err(SyncError::credentials)?;

        let provider = match source.source_type() {
            SourceType::Google => self.providers.google(&token),
            SourceType::Microsoft => self.providers.microsoft(&token),
            SourceType::CardDav => {
                return Err(SyncError::Configuration(
                    "CardDAV source routed to the OAuth handler".to_string(),
                ))
            }
        }
        .map_err(|e| SyncError::Configuration(format!("{e:#}")))?;

        let addressbook = self
            .write("get_or_create_addressbook", || {
                self.store
                    .get_or_create_addressbook(source.id(), VIRTUAL_ADDRESSBOOK_PATH, source.name())
            })
            .await?;

        let mut report = SyncReport::new(source);
        report
            .addressbooks
            .push(self.sync_addressbook(provider.as_ref(), &addressbook, cancel).await?);
        Ok(report)
    }

    // ========================================================================
    // Addressbook sync
    // ========================================================================

    /// Fetches and applies one batch; the checkpoint moves only on success
    async fn sync_addressbook<P>(
        &self,
        provider: &P,
        addressbook: &Addressbook,
        cancel: &CancellationToken,
    ) -> Result<AddressbookReport, SyncError>
    where
        P: IContactProvider + ?Sized,
    {
        debug!(
            addressbook = %addressbook.path,
            incremental = !addressbook.needs_full_sync(),
            "Fetching changes"
        );

        let batch = cancellable(
            cancel,
            provider.fetch_changes(&addressbook.path, &addressbook.sync_token),
        )
        .await?
        .map_err(SyncError::provider)?;

        let report = self.apply_batch(addressbook, &batch).await?;

        self.write("update_addressbook_sync_token", || {
            self.store
                .update_addressbook_sync_token(addressbook.id, &batch.next_checkpoint)
        })
        .await?;

        info!(
            addressbook = %addressbook.path,
            full_sync = report.full_sync,
            records = report.records,
            written = report.written,
            deleted = report.deleted,
            skipped = report.skipped,
            "Addressbook synced"
        );
        Ok(report)
    }

    async fn apply_batch(
        &self,
        addressbook: &Addressbook,
        batch: &RemoteContactBatch,
    ) -> Result<AddressbookReport, SyncError> {
        let mut report = AddressbookReport {
            path: addressbook.path.clone(),
            full_sync: batch.is_full_sync,
            records: batch.updated_records(),
            written: 0,
            skipped: 0,
            deleted: 0,
        };

        if batch.is_full_sync {
            let written = self
                .write("replace_addressbook_contacts", || {
                    self.store
                        .replace_addressbook_contacts(addressbook.id, &batch.updated)
                })
                .await?;
            report.written = written.written;
            report.skipped = written.skipped;
            return Ok(report);
        }

        if !batch.deleted.is_empty() {
            report.deleted = self
                .write("delete_contacts_by_hrefs", || {
                    self.store
                        .delete_contacts_by_hrefs(addressbook.id, &batch.deleted)
                })
                .await?;
        }

        if !batch.updated.is_empty() {
            let written = self
                .write("upsert_contacts_batch", || {
                    self.store.upsert_contacts_batch(addressbook.id, &batch.updated)
                })
                .await?;
            report.written = written.written;
            report.skipped = written.skipped;
        }

        Ok(report)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Runs a store write under the retry policy
    async fn write<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        with_retry(&self.settings.retry, operation, f)
            .await
            .map_err(SyncError::store)
    }

    /// Records the outcome on the source and converts it to the caller's result
    async fn finish(
        &self,
        source: &ContactSource,
        outcome: Result<SyncReport, SyncError>,
    ) -> Result<SyncReport, SyncError> {
        let error_message = match &outcome {
            Ok(report) if report.failures.is_empty() => String::new(),
            Ok(report) => report.failures.join("; "),
            Err(SyncError::Cancelled) => {
                info!(name = source.name(), "Sync cancelled");
                return Err(SyncError::Cancelled);
            }
            Err(e) => e.to_string(),
        };

        let status = self
            .write("update_source_sync_status", || {
                self.store
                    .update_source_sync_status(source.id(), &error_message)
            })
            .await;

        match outcome {
            Ok(report) if report.failures.is_empty() => {
                status?;
                info!(
                    name = source.name(),
                    addressbooks = report.addressbooks.len(),
                    rows = report.rows_written(),
                    duration_ms = report.duration_ms,
                    "Source sync complete"
                );
                Ok(report)
            }
            Ok(report) => {
                if let Err(e) = status {
                    warn!(error = %e, "Failed to record sync failure");
                }
                Err(SyncError::Partial {
                    failures: report.failures,
                })
            }
            Err(e) => {
                if let Err(status_err) = status {
                    warn!(error = %status_err, "Failed to record sync failure");
                }
                warn!(name = source.name(), error = %e, "Source sync failed");
                Err(e)
            }
        }
    }
}

/// Races `fut` against the cancellation token
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Result<anyhow::Result<T>, SyncError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = fut => Ok(result),
    }
}
