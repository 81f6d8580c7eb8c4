//! Autocomplete over synced contacts
//!
//! Only contacts of enabled sources are returned, one row per address even
//! when it appears in several addressbooks. Each suggestion is labelled with
//! the type of the source it came from.

use std::str::FromStr;

use sqlx::{Row, SqlitePool};

use addrsync_core::domain::{ContactSuggestion, SourceType, SuggestionSource};
use addrsync_core::ports::IContactSearcher;

use crate::{like_pattern, CacheError};

/// [`IContactSearcher`] over the synced-contacts table
pub struct SyncedContactSearcher {
    pool: SqlitePool,
}

impl SyncedContactSearcher {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IContactSearcher for SyncedContactSearcher {
    fn name(&self) -> &str {
        "synced"
    }

    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<ContactSuggestion>> {
        let pattern = like_pattern(query);
        let rows = sqlx::query(
            "SELECT c.email, MAX(c.display_name) AS display_name, MIN(s.source_type) AS source_type \
             FROM synced_contacts c \
             JOIN addressbooks a ON a.id = c.addressbook_id \
             JOIN contact_sources s ON s.id = a.source_id \
             WHERE s.enabled = 1 \
               AND (c.email LIKE ? ESCAPE '\\' OR c.display_name LIKE ? ESCAPE '\\') \
             GROUP BY c.email \
             ORDER BY c.email ASC \
             LIMIT ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        let suggestions = rows
            .iter()
            .map(|row| {
                let email: String = row.get("email");
                let name: String = row.get("display_name");
                let type_str: String = row.get("source_type");
                let source = SourceType::from_str(&type_str)
                    .map(SuggestionSource::from)
                    .unwrap_or(SuggestionSource::Other);
                ContactSuggestion::new(&email, name, source)
            })
            .collect();

        Ok(suggestions)
    }
}
