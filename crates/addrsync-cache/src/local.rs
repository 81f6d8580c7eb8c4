//! Send history: recipients learned from outgoing mail
//!
//! Rows here are never touched by sync; only [`SqliteLocalContactStore::delete`]
//! removes them.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use addrsync_core::domain::{Email, LocalContact};
use addrsync_core::ports::ILocalContactStore;

use crate::{format_datetime, like_pattern, parse_datetime, CacheError};

/// SQLite-backed [`ILocalContactStore`]
pub struct SqliteLocalContactStore {
    pool: SqlitePool,
}

impl SqliteLocalContactStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records a send at an explicit time
    pub async fn record_sent_at(
        &self,
        email: &str,
        display_name: &str,
        at: DateTime<Utc>,
    ) -> Result<LocalContact, CacheError> {
        let email = Email::new(email)?;

        sqlx::query(
            "INSERT INTO local_contacts (email, display_name, send_count, last_used) \
             VALUES (?, ?, 1, ?) \
             ON CONFLICT (email) DO UPDATE SET \
             send_count = local_contacts.send_count + 1, \
             last_used = excluded.last_used, \
             display_name = CASE WHEN excluded.display_name != '' \
                 THEN excluded.display_name ELSE local_contacts.display_name END",
        )
        .bind(email.as_str())
        .bind(display_name.trim())
        .bind(format_datetime(&at))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT email, display_name, send_count, last_used FROM local_contacts WHERE email = ?",
        )
        .bind(email.as_str())
        .fetch_one(&self.pool)
        .await?;

        local_contact_from_row(&row)
    }
}

fn local_contact_from_row(row: &SqliteRow) -> Result<LocalContact, CacheError> {
    let last_used: String = row.get("last_used");
    Ok(LocalContact {
        email: row.get("email"),
        display_name: row.get("display_name"),
        send_count: row.get("send_count"),
        last_used: parse_datetime(&last_used)?,
    })
}

#[async_trait::async_trait]
impl ILocalContactStore for SqliteLocalContactStore {
    async fn record_sent(&self, email: &str, display_name: &str) -> anyhow::Result<LocalContact> {
        let contact = self.record_sent_at(email, display_name, Utc::now()).await?;
        tracing::debug!(email = %contact.email, send_count = contact.send_count, "Recorded sent address");
        Ok(contact)
    }

    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<LocalContact>> {
        let pattern = like_pattern(query);
        let rows = sqlx::query(
            "SELECT email, display_name, send_count, last_used FROM local_contacts \
             WHERE email LIKE ? ESCAPE '\\' OR display_name LIKE ? ESCAPE '\\' \
             ORDER BY send_count DESC, last_used DESC \
             LIMIT ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        rows.iter()
            .map(|r| local_contact_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn delete(&self, email: &str) -> anyhow::Result<bool> {
        let email = Email::new(email).map_err(CacheError::from)?;
        let result = sqlx::query("DELETE FROM local_contacts WHERE email = ?")
            .bind(email.as_str())
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> anyhow::Result<Vec<LocalContact>> {
        let rows = sqlx::query(
            "SELECT email, display_name, send_count, last_used FROM local_contacts \
             ORDER BY send_count DESC, last_used DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        rows.iter()
            .map(|r| local_contact_from_row(r).map_err(Into::into))
            .collect()
    }
}
