//! CLI subcommands and the wiring they share

pub mod carddav;
pub mod search;
pub mod source;
pub mod sync;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use addrsync_cache::{DatabasePool, SqliteContactStore, SqliteLocalContactStore, SyncedContactSearcher};
use addrsync_core::config::Config;
use addrsync_core::domain::{ContactSource, SourceId};
use addrsync_core::ports::{IContactSearcher, IContactStore};
use addrsync_remote::ProviderFactory;
use addrsync_search::{AutocompleteService, VCardCache};
use addrsync_sync::{SyncOrchestrator, SyncSettings};
use tracing::{info, warn};

use crate::credentials::KeyringCredentials;

/// Loads the configuration from `path` or the default location
pub fn load_config(path: Option<&str>) -> Config {
    let path = path.map(PathBuf::from).unwrap_or_else(Config::default_path);
    Config::load_or_default(&path)
}

/// Logs every invalid configuration value
pub fn report_config_problems(config: &Config) {
    for problem in config.validate() {
        warn!(%problem, "Invalid configuration value");
    }
}

/// Database, store and collaborators opened for one command
pub struct AppContext {
    pub config: Config,
    pool: DatabasePool,
    pub store: Arc<SqliteContactStore>,
    pub credentials: KeyringCredentials,
}

impl AppContext {
    pub async fn open(config: Config) -> Result<Self> {
        let pool = DatabasePool::with_config(&config.database)
            .await
            .context("Failed to open database")?;
        info!(path = %config.database.path.display(), "Opened contact database");

        let store = Arc::new(SqliteContactStore::new(pool.pool().clone()));
        Ok(Self {
            config,
            pool,
            store,
            credentials: KeyringCredentials,
        })
    }

    pub fn orchestrator(&self) -> Result<SyncOrchestrator> {
        let providers =
            ProviderFactory::from_config(&self.config).context("Failed to build HTTP clients")?;
        Ok(SyncOrchestrator::new(
            self.store.clone(),
            Arc::new(providers),
            Arc::new(self.credentials),
            SyncSettings::from(&self.config),
        ))
    }

    pub fn autocomplete(&self) -> AutocompleteService {
        let vcards: Arc<dyn IContactSearcher> =
            Arc::new(VCardCache::from_config(&self.config.autocomplete));
        let synced: Arc<dyn IContactSearcher> =
            Arc::new(SyncedContactSearcher::new(self.pool.pool().clone()));
        AutocompleteService::new(
            Arc::new(SqliteLocalContactStore::new(self.pool.pool().clone())),
            vec![vcards, synced],
            self.config.autocomplete.default_limit,
        )
    }

    /// Looks up a source by ID
    pub async fn source(&self, id: &str) -> Result<ContactSource> {
        let id = SourceId::from_str(id).with_context(|| format!("Invalid source ID: {id}"))?;
        self.store
            .get_source(&id)
            .await?
            .with_context(|| format!("No source with ID {id}"))
    }
}
