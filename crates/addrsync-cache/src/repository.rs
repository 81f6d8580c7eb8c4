//! SQLite implementation of IContactStore
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                        |
//! |-----------------|----------|-------------------------------------------------|
//! | SourceId        | TEXT     | UUID string via `.to_string()` / `FromStr`      |
//! | AddressbookId   | INTEGER  | Row id                                          |
//! | SourceType      | TEXT     | `as_str()` / `FromStr`                          |
//! | DateTime<Utc>   | TEXT     | RFC 3339, microsecond precision, `Z` suffix     |
//! | bool            | INTEGER  | 0 / 1                                           |
//!
//! Contact writes are best effort: a row that cannot be stored is logged and
//! skipped, but lock contention aborts the whole transaction so the caller
//! can retry it.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use addrsync_core::domain::{
    Addressbook, AddressbookId, ContactSource, ParsedContact, SourceId, SourceType,
    SyncedContact,
};
use addrsync_core::ports::{BatchReport, IContactStore};

use crate::{format_datetime, parse_datetime, parse_optional_datetime, CacheError};

/// SQLite-based implementation of the contact store port
pub struct SqliteContactStore {
    pool: SqlitePool,
}

impl SqliteContactStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts rows inside an open transaction
    ///
    /// Busy/locked errors abort; any other per-row failure is logged and the
    /// row skipped.
    async fn insert_rows(
        tx: &mut Transaction<'_, Sqlite>,
        addressbook_id: AddressbookId,
        contacts: &[ParsedContact],
    ) -> Result<BatchReport, CacheError> {
        let mut report = BatchReport::default();
        let now = format_datetime(&Utc::now());

        for contact in contacts {
            if !contact.is_storable() {
                tracing::warn!(
                    addressbook_id = %addressbook_id,
                    href = %contact.href,
                    "Skipping contact row without href or email"
                );
                report.skipped += 1;
                continue;
            }

            let result = sqlx::query(
                "INSERT INTO synced_contacts \
                 (addressbook_id, href, etag, email, display_name, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (addressbook_id, href, email) DO UPDATE SET \
                 etag = excluded.etag, \
                 display_name = excluded.display_name, \
                 updated_at = excluded.updated_at",
            )
            .bind(addressbook_id.value())
            .bind(&contact.href)
            .bind(&contact.etag)
            .bind(&contact.email)
            .bind(&contact.display_name)
            .bind(&now)
            .execute(&mut **tx)
            .await;

            match result.map_err(CacheError::from) {
                Ok(_) => report.written += 1,
                Err(e) if e.is_busy() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        addressbook_id = %addressbook_id,
                        href = %contact.href,
                        email = %contact.email,
                        error = %e,
                        "Skipping contact row that failed to store"
                    );
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }

    async fn fetch_addressbook(
        &self,
        source_id: &SourceId,
        path: &str,
    ) -> Result<Addressbook, CacheError> {
        let row = sqlx::query(
            "SELECT id, source_id, path, display_name, sync_token, last_synced_at \
             FROM addressbooks WHERE source_id = ? AND path = ?",
        )
        .bind(source_id.to_string())
        .bind(path)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CacheError::NotFound(format!("addressbook {path} of source {source_id}")))?;

        addressbook_from_row(&row)
    }
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn source_from_row(row: &SqliteRow) -> Result<ContactSource, CacheError> {
    let id_str: String = row.get("id");
    let type_str: String = row.get("source_type");
    let created_at_str: String = row.get("created_at");

    let id = SourceId::from_str(&id_str)
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;
    let source_type = SourceType::from_str(&type_str)
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;

    let mut source = ContactSource::with_id(
        id,
        row.get::<String, _>("name"),
        source_type,
        parse_datetime(&created_at_str)?,
    );
    source.set_url(row.get("url"));
    source.set_username(row.get("username"));
    source.set_linked_account_id(row.get("linked_account_id"));
    source.set_enabled(row.get::<i64, _>("enabled") != 0);
    source.set_sync_interval_minutes(
        u32::try_from(row.get::<i64, _>("sync_interval_minutes")).unwrap_or(0),
    );
    source.restore_status(
        parse_optional_datetime(row.get("last_synced_at"))?,
        row.get("last_error"),
        parse_optional_datetime(row.get("last_error_at"))?,
    );
    Ok(source)
}

fn addressbook_from_row(row: &SqliteRow) -> Result<Addressbook, CacheError> {
    let source_id_str: String = row.get("source_id");
    Ok(Addressbook {
        id: AddressbookId::new(row.get("id")),
        source_id: SourceId::from_str(&source_id_str)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?,
        path: row.get("path"),
        display_name: row.get("display_name"),
        sync_token: row.get("sync_token"),
        last_synced_at: parse_optional_datetime(row.get("last_synced_at"))?,
    })
}

fn contact_from_row(row: &SqliteRow) -> Result<SyncedContact, CacheError> {
    let updated_at: String = row.get("updated_at");
    Ok(SyncedContact {
        id: row.get("id"),
        addressbook_id: AddressbookId::new(row.get("addressbook_id")),
        href: row.get("href"),
        etag: row.get("etag"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        updated_at: parse_datetime(&updated_at)?,
    })
}

/// Empty strings are stored as NULL so the linked-account index ignores them
fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ============================================================================
// IContactStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IContactStore for SqliteContactStore {
    // --- Source operations ---

    async fn create_source(&self, source: &ContactSource) -> anyhow::Result<()> {
        source.validate().map_err(CacheError::from)?;

        sqlx::query(
            "INSERT INTO contact_sources \
             (id, name, source_type, url, username, linked_account_id, enabled, \
              sync_interval_minutes, last_synced_at, last_error, last_error_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(source.id().to_string())
        .bind(source.name())
        .bind(source.source_type().as_str())
        .bind(non_empty(source.url()))
        .bind(non_empty(source.username()))
        .bind(non_empty(source.linked_account_id()))
        .bind(source.is_enabled())
        .bind(i64::from(source.sync_interval_minutes()))
        .bind(source.last_synced_at().as_ref().map(format_datetime))
        .bind(source.last_error())
        .bind(source.last_error_at().as_ref().map(format_datetime))
        .bind(format_datetime(&source.created_at()))
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        tracing::debug!(source_id = %source.id(), source_type = %source.source_type(), "Created source");
        Ok(())
    }

    async fn update_source(&self, source: &ContactSource) -> anyhow::Result<()> {
        source.validate().map_err(CacheError::from)?;

        let result = sqlx::query(
            "UPDATE contact_sources SET \
             name = ?, url = ?, username = ?, linked_account_id = ?, enabled = ?, \
             sync_interval_minutes = ? \
             WHERE id = ?",
        )
        .bind(source.name())
        .bind(non_empty(source.url()))
        .bind(non_empty(source.username()))
        .bind(non_empty(source.linked_account_id()))
        .bind(source.is_enabled())
        .bind(i64::from(source.sync_interval_minutes()))
        .bind(source.id().to_string())
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        if result.rows_affected() == 0 {
            return Err(CacheError::NotFound(format!("source {}", source.id())).into());
        }

        tracing::debug!(source_id = %source.id(), "Updated source");
        Ok(())
    }

    async fn get_source(&self, id: &SourceId) -> anyhow::Result<Option<ContactSource>> {
        let row = sqlx::query("SELECT * FROM contact_sources WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::from)?;

        match row {
            Some(ref r) => Ok(Some(source_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_sources(&self) -> anyhow::Result<Vec<ContactSource>> {
        let rows = sqlx::query("SELECT * FROM contact_sources ORDER BY name ASC, created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(CacheError::from)?;

        rows.iter()
            .map(|r| source_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn delete_source(&self, id: &SourceId) -> anyhow::Result<bool> {
        let id_str = id.to_string();
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;

        sqlx::query(
            "DELETE FROM synced_contacts WHERE addressbook_id IN \
             (SELECT id FROM addressbooks WHERE source_id = ?)",
        )
        .bind(&id_str)
        .execute(&mut *tx)
        .await
        .map_err(CacheError::from)?;

        sqlx::query("DELETE FROM addressbooks WHERE source_id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await
            .map_err(CacheError::from)?;

        let result = sqlx::query("DELETE FROM contact_sources WHERE id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await
            .map_err(CacheError::from)?;

        tx.commit().await.map_err(CacheError::from)?;

        let deleted = result.rows_affected() > 0;
        tracing::debug!(source_id = %id, deleted, "Deleted source");
        Ok(deleted)
    }

    async fn list_source_errors(&self) -> anyhow::Result<Vec<ContactSource>> {
        let rows = sqlx::query(
            "SELECT * FROM contact_sources \
             WHERE last_error IS NOT NULL AND last_error != '' \
             ORDER BY last_error_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        rows.iter()
            .map(|r| source_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn update_source_sync_status(&self, id: &SourceId, error: &str) -> anyhow::Result<()> {
        let now = format_datetime(&Utc::now());

        let query = if error.is_empty() {
            sqlx::query(
                "UPDATE contact_sources SET \
                 last_synced_at = ?, last_error = NULL, last_error_at = NULL \
                 WHERE id = ?",
            )
            .bind(now)
        } else {
            sqlx::query(
                "UPDATE contact_sources SET last_error = ?, last_error_at = ? WHERE id = ?",
            )
            .bind(error.to_string())
            .bind(now)
        };

        let result = query
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;

        if result.rows_affected() == 0 {
            return Err(CacheError::NotFound(format!("source {id}")).into());
        }

        tracing::trace!(source_id = %id, failed = !error.is_empty(), "Updated source sync status");
        Ok(())
    }

    // --- Addressbook operations ---

    async fn upsert_addressbook(
        &self,
        source_id: &SourceId,
        path: &str,
        display_name: &str,
    ) -> anyhow::Result<Addressbook> {
        sqlx::query(
            "INSERT INTO addressbooks (source_id, path, display_name) VALUES (?, ?, ?) \
             ON CONFLICT (source_id, path) DO UPDATE SET display_name = excluded.display_name",
        )
        .bind(source_id.to_string())
        .bind(path)
        .bind(display_name)
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        Ok(self.fetch_addressbook(source_id, path).await?)
    }

    async fn get_or_create_addressbook(
        &self,
        source_id: &SourceId,
        path: &str,
        display_name: &str,
    ) -> anyhow::Result<Addressbook> {
        sqlx::query(
            "INSERT INTO addressbooks (source_id, path, display_name) VALUES (?, ?, ?) \
             ON CONFLICT (source_id, path) DO NOTHING",
        )
        .bind(source_id.to_string())
        .bind(path)
        .bind(display_name)
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        Ok(self.fetch_addressbook(source_id, path).await?)
    }

    async fn list_addressbooks(&self, source_id: &SourceId) -> anyhow::Result<Vec<Addressbook>> {
        let rows = sqlx::query(
            "SELECT id, source_id, path, display_name, sync_token, last_synced_at \
             FROM addressbooks WHERE source_id = ? ORDER BY path ASC",
        )
        .bind(source_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        rows.iter()
            .map(|r| addressbook_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn prune_addressbooks(
        &self,
        source_id: &SourceId,
        keep_paths: &[String],
    ) -> anyhow::Result<u64> {
        let mut sql = String::from("DELETE FROM addressbooks WHERE source_id = ?");
        if !keep_paths.is_empty() {
            let placeholders = vec!["?"; keep_paths.len()].join(", ");
            sql.push_str(&format!(" AND path NOT IN ({placeholders})"));
        }

        let mut query = sqlx::query(&sql).bind(source_id.to_string());
        for path in keep_paths {
            query = query.bind(path);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(source_id = %source_id, removed, "Pruned vanished addressbooks");
        }
        Ok(removed)
    }

    async fn update_addressbook_sync_token(
        &self,
        id: AddressbookId,
        token: &str,
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE addressbooks SET sync_token = ?, last_synced_at = ? WHERE id = ?",
        )
        .bind(token)
        .bind(format_datetime(&Utc::now()))
        .bind(id.value())
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        if result.rows_affected() == 0 {
            return Err(CacheError::NotFound(format!("addressbook {id}")).into());
        }
        Ok(())
    }

    // --- Contact operations ---

    async fn upsert_contacts_batch(
        &self,
        addressbook_id: AddressbookId,
        contacts: &[ParsedContact],
    ) -> anyhow::Result<BatchReport> {
        if contacts.is_empty() {
            return Ok(BatchReport::default());
        }

        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;

        // Rows of a changed record are replaced wholesale so removed addresses disappear
        let hrefs: BTreeSet<&str> = contacts
            .iter()
            .filter(|c| c.is_storable())
            .map(|c| c.href.as_str())
            .collect();
        for href in hrefs {
            sqlx::query("DELETE FROM synced_contacts WHERE addressbook_id = ? AND href = ?")
                .bind(addressbook_id.value())
                .bind(href)
                .execute(&mut *tx)
                .await
                .map_err(CacheError::from)?;
        }

        let report = Self::insert_rows(&mut tx, addressbook_id, contacts).await?;
        tx.commit().await.map_err(CacheError::from)?;

        tracing::debug!(
            addressbook_id = %addressbook_id,
            written = report.written,
            skipped = report.skipped,
            "Upserted contact batch"
        );
        Ok(report)
    }

    async fn delete_contacts_by_hrefs(
        &self,
        addressbook_id: AddressbookId,
        hrefs: &[String],
    ) -> anyhow::Result<u64> {
        if hrefs.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;
        let mut removed = 0;
        for href in hrefs {
            let result =
                sqlx::query("DELETE FROM synced_contacts WHERE addressbook_id = ? AND href = ?")
                    .bind(addressbook_id.value())
                    .bind(href)
                    .execute(&mut *tx)
                    .await
                    .map_err(CacheError::from)?;
            removed += result.rows_affected();
        }
        tx.commit().await.map_err(CacheError::from)?;

        tracing::debug!(addressbook_id = %addressbook_id, removed, "Deleted contacts by href");
        Ok(removed)
    }

    async fn delete_contacts_for_addressbook(
        &self,
        addressbook_id: AddressbookId,
    ) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;
        let result = sqlx::query("DELETE FROM synced_contacts WHERE addressbook_id = ?")
            .bind(addressbook_id.value())
            .execute(&mut *tx)
            .await
            .map_err(CacheError::from)?;
        tx.commit().await.map_err(CacheError::from)?;

        Ok(result.rows_affected())
    }

    async fn replace_addressbook_contacts(
        &self,
        addressbook_id: AddressbookId,
        contacts: &[ParsedContact],
    ) -> anyhow::Result<BatchReport> {
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;

        let cleared = sqlx::query("DELETE FROM synced_contacts WHERE addressbook_id = ?")
            .bind(addressbook_id.value())
            .execute(&mut *tx)
            .await
            .map_err(CacheError::from)?
            .rows_affected();

        let report = Self::insert_rows(&mut tx, addressbook_id, contacts).await?;
        tx.commit().await.map_err(CacheError::from)?;

        tracing::debug!(
            addressbook_id = %addressbook_id,
            cleared,
            written = report.written,
            skipped = report.skipped,
            "Replaced addressbook contacts"
        );
        Ok(report)
    }

    async fn list_contacts(
        &self,
        addressbook_id: AddressbookId,
    ) -> anyhow::Result<Vec<SyncedContact>> {
        let rows = sqlx::query(
            "SELECT id, addressbook_id, href, etag, email, display_name, updated_at \
             FROM synced_contacts WHERE addressbook_id = ? ORDER BY email ASC, href ASC",
        )
        .bind(addressbook_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        rows.iter()
            .map(|r| contact_from_row(r).map_err(Into::into))
            .collect()
    }
}
