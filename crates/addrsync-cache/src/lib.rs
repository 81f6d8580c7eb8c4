//! addrsync Cache - Local contact persistence
//!
//! SQLite-based storage for:
//! - Contact sources and their sync status
//! - Addressbooks and their checkpoints
//! - Synced contact rows
//! - Recipients learned from outgoing mail
//!
//! ## Architecture
//!
//! This crate implements the `IContactStore`, `ILocalContactStore` and
//! `IContactSearcher` ports from `addrsync-core` on top of SQLite. It is a
//! driven (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteContactStore`] - `IContactStore` implementation
//! - [`SqliteLocalContactStore`] - Send history (`ILocalContactStore`)
//! - [`SyncedContactSearcher`] - Autocomplete over synced contacts
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use addrsync_cache::{DatabasePool, SqliteContactStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/addrsync/contacts.db")).await?;
//! let store = SqliteContactStore::new(pool.pool().clone());
//! // Use store as IContactStore...
//! # Ok(())
//! # }
//! ```

pub mod local;
pub mod pool;
pub mod repository;
pub mod searcher;

pub use local::SqliteLocalContactStore;
pub use pool::DatabasePool;
pub use repository::SqliteContactStore;
pub use searcher::SyncedContactSearcher;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The database was locked by another writer (SQLITE_BUSY / SQLITE_LOCKED)
    #[error("database is locked: {0}")]
    Busy(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be converted back to a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The caller supplied data the domain rejects
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl CacheError {
    /// Returns true for lock contention that is safe to retry
    pub fn is_busy(&self) -> bool {
        matches!(self, CacheError::Busy(_))
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            // Extended result codes carry the primary code in the low byte
            let primary = db_err
                .code()
                .and_then(|c| c.parse::<i32>().ok())
                .map(|c| c & 0xff);
            if matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED)) {
                return CacheError::Busy(db_err.message().to_string());
            }
        }
        let message = e.to_string();
        if message.contains("database is locked") || message.contains("database table is locked")
        {
            return CacheError::Busy(message);
        }
        CacheError::QueryFailed(message)
    }
}

impl From<addrsync_core::domain::DomainError> for CacheError {
    fn from(e: addrsync_core::domain::DomainError) -> Self {
        CacheError::InvalidData(e.to_string())
    }
}

/// Builds a `LIKE` pattern matching `query` anywhere, escaping `%`, `_` and `\`
pub(crate) fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Formats a timestamp with fixed precision so TEXT columns sort chronologically
pub(crate) fn format_datetime(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Parses a timestamp written by [`format_datetime`]
pub(crate) fn parse_datetime(s: &str) -> Result<chrono::DateTime<chrono::Utc>, CacheError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Parses an optional timestamp column
pub(crate) fn parse_optional_datetime(
    s: Option<String>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}
