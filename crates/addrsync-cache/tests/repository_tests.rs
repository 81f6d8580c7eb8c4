//! Integration tests for the SQLite contact store
//!
//! Each test creates a fresh in-memory database to ensure isolation.

use chrono::{Duration, Utc};

use addrsync_cache::{
    DatabasePool, SqliteContactStore, SqliteLocalContactStore, SyncedContactSearcher,
};
use addrsync_core::domain::{
    AddressbookId, ContactSource, ParsedContact, SourceId, SourceType, SuggestionSource,
    VIRTUAL_ADDRESSBOOK_PATH,
};
use addrsync_core::ports::{BatchReport, IContactSearcher, IContactStore, ILocalContactStore};

// ============================================================================
// Test helpers
// ============================================================================

async fn setup() -> (DatabasePool, SqliteContactStore) {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let store = SqliteContactStore::new(pool.pool().clone());
    (pool, store)
}

async fn create_carddav_source(store: &SqliteContactStore) -> ContactSource {
    let source = ContactSource::carddav("Work", "https://dav.example.com/", "alice");
    store.create_source(&source).await.unwrap();
    source
}

fn contact(href: &str, email: &str, name: &str) -> ParsedContact {
    ParsedContact::new(href, "\"etag-1\"", email, name)
}

fn emails(contacts: &[addrsync_core::domain::SyncedContact]) -> Vec<String> {
    contacts.iter().map(|c| c.email.clone()).collect()
}

// ============================================================================
// Source tests
// ============================================================================

#[tokio::test]
async fn test_create_and_get_source() {
    let (_pool, store) = setup().await;
    let source = create_carddav_source(&store).await;

    let loaded = store.get_source(source.id()).await.unwrap().unwrap();
    assert_eq!(loaded.name(), "Work");
    assert_eq!(loaded.source_type(), SourceType::CardDav);
    assert_eq!(loaded.url(), Some("https://dav.example.com/"));
    assert_eq!(loaded.username(), Some("alice"));
    assert!(loaded.is_enabled());
    assert!(loaded.last_synced_at().is_none());
}

#[tokio::test]
async fn test_get_missing_source_returns_none() {
    let (_pool, store) = setup().await;
    assert!(store.get_source(&SourceId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_source_rejects_invalid_config() {
    let (_pool, store) = setup().await;
    let source = ContactSource::carddav("Broken", "", "alice");
    let err = store.create_source(&source).await.unwrap_err();
    assert!(format!("{err:#}").contains("Invalid data"));
    assert!(store.list_sources().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_linked_account_is_unique() {
    let (_pool, store) = setup().await;
    let first = ContactSource::oauth(
        "Gmail",
        SourceType::Google,
        Some("alice@gmail.com".to_string()),
    );
    store.create_source(&first).await.unwrap();

    let second = ContactSource::oauth(
        "Gmail again",
        SourceType::Google,
        Some("alice@gmail.com".to_string()),
    );
    assert!(store.create_source(&second).await.is_err());

    // Unlinked sources never collide
    store
        .create_source(&ContactSource::oauth("A", SourceType::Microsoft, None))
        .await
        .unwrap();
    store
        .create_source(&ContactSource::oauth("B", SourceType::Microsoft, None))
        .await
        .unwrap();
    assert_eq!(store.list_sources().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_update_source() {
    let (_pool, store) = setup().await;
    let mut source = create_carddav_source(&store).await;

    source.set_name("Personal");
    source.set_enabled(false);
    source.set_sync_interval_minutes(15);
    store.update_source(&source).await.unwrap();

    let loaded = store.get_source(source.id()).await.unwrap().unwrap();
    assert_eq!(loaded.name(), "Personal");
    assert!(!loaded.is_enabled());
    assert_eq!(loaded.sync_interval_minutes(), 15);
}

#[tokio::test]
async fn test_update_missing_source_fails() {
    let (_pool, store) = setup().await;
    let source = ContactSource::carddav("Ghost", "https://dav.example.com", "bob");
    assert!(store.update_source(&source).await.is_err());
}

#[tokio::test]
async fn test_sync_status_error_then_success() {
    let (_pool, store) = setup().await;
    let source = create_carddav_source(&store).await;

    store.update_source_sync_status(source.id(), "").await.unwrap();
    let synced = store.get_source(source.id()).await.unwrap().unwrap();
    let synced_at = synced.last_synced_at().expect("marked synced");

    store
        .update_source_sync_status(source.id(), "HTTP 500")
        .await
        .unwrap();
    let failed = store.get_source(source.id()).await.unwrap().unwrap();
    assert_eq!(failed.last_error(), Some("HTTP 500"));
    assert!(failed.last_error_at().is_some());
    // a failure never advances the success marker
    assert_eq!(failed.last_synced_at(), Some(synced_at));

    let errors = store.list_source_errors().await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].id(), source.id());

    store.update_source_sync_status(source.id(), "").await.unwrap();
    let cleared = store.get_source(source.id()).await.unwrap().unwrap();
    assert!(cleared.last_error().is_none());
    assert!(cleared.last_error_at().is_none());
    assert!(store.list_source_errors().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_source_cascades() {
    let (_pool, store) = setup().await;
    let source = create_carddav_source(&store).await;
    let ab = store
        .upsert_addressbook(source.id(), "/dav/alice/contacts/", "Contacts")
        .await
        .unwrap();
    store
        .upsert_contacts_batch(ab.id, &[contact("/c/1.vcf", "a@x.org", "A")])
        .await
        .unwrap();

    assert!(store.delete_source(source.id()).await.unwrap());
    assert!(store.get_source(source.id()).await.unwrap().is_none());
    assert!(store.list_addressbooks(source.id()).await.unwrap().is_empty());
    assert!(store.list_contacts(ab.id).await.unwrap().is_empty());

    assert!(!store.delete_source(source.id()).await.unwrap());
}

// ============================================================================
// Addressbook tests
// ============================================================================

#[tokio::test]
async fn test_upsert_addressbook_keeps_token() {
    let (_pool, store) = setup().await;
    let source = create_carddav_source(&store).await;

    let ab = store
        .upsert_addressbook(source.id(), "/dav/contacts/", "Contacts")
        .await
        .unwrap();
    assert!(ab.needs_full_sync());
    store
        .update_addressbook_sync_token(ab.id, "sync-token-1")
        .await
        .unwrap();

    let again = store
        .upsert_addressbook(source.id(), "/dav/contacts/", "Renamed")
        .await
        .unwrap();
    assert_eq!(again.id, ab.id);
    assert_eq!(again.display_name, "Renamed");
    assert_eq!(again.sync_token, "sync-token-1");
    assert!(again.last_synced_at.is_some());
}

#[tokio::test]
async fn test_get_or_create_virtual_addressbook() {
    let (_pool, store) = setup().await;
    let source = ContactSource::oauth("Gmail", SourceType::Google, None);
    store.create_source(&source).await.unwrap();

    let first = store
        .get_or_create_addressbook(source.id(), VIRTUAL_ADDRESSBOOK_PATH, "Google")
        .await
        .unwrap();
    store
        .update_addressbook_sync_token(first.id, "CPjK")
        .await
        .unwrap();

    let second = store
        .get_or_create_addressbook(source.id(), VIRTUAL_ADDRESSBOOK_PATH, "Other name")
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.display_name, "Google");
    assert_eq!(second.sync_token, "CPjK");
}

#[tokio::test]
async fn test_prune_addressbooks() {
    let (_pool, store) = setup().await;
    let source = create_carddav_source(&store).await;
    for path in ["/ab/a/", "/ab/b/", "/ab/c/"] {
        store.upsert_addressbook(source.id(), path, path).await.unwrap();
    }

    let removed = store
        .prune_addressbooks(source.id(), &["/ab/a/".to_string(), "/ab/c/".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let paths: Vec<String> = store
        .list_addressbooks(source.id())
        .await
        .unwrap()
        .into_iter()
        .map(|ab| ab.path)
        .collect();
    assert_eq!(paths, vec!["/ab/a/", "/ab/c/"]);

    assert_eq!(store.prune_addressbooks(source.id(), &[]).await.unwrap(), 2);
}

#[tokio::test]
async fn test_update_token_for_missing_addressbook_fails() {
    let (_pool, store) = setup().await;
    assert!(store
        .update_addressbook_sync_token(AddressbookId::new(999), "t")
        .await
        .is_err());
}

// ============================================================================
// Contact tests
// ============================================================================

#[tokio::test]
async fn test_upsert_batch_is_idempotent() {
    let (_pool, store) = setup().await;
    let source = create_carddav_source(&store).await;
    let ab = store.upsert_addressbook(source.id(), "/ab/", "AB").await.unwrap();

    let batch = vec![
        contact("/ab/1.vcf", "alice@example.com", "Alice"),
        contact("/ab/1.vcf", "alice@work.example.com", "Alice"),
        contact("/ab/2.vcf", "bob@example.com", "Bob"),
    ];
    let first = store.upsert_contacts_batch(ab.id, &batch).await.unwrap();
    assert_eq!(first, BatchReport { written: 3, skipped: 0 });
    let before = emails(&store.list_contacts(ab.id).await.unwrap());

    store.upsert_contacts_batch(ab.id, &batch).await.unwrap();
    let after = emails(&store.list_contacts(ab.id).await.unwrap());
    assert_eq!(before, after);
    assert_eq!(after.len(), 3);
}

#[tokio::test]
async fn test_upsert_replaces_rows_of_changed_record() {
    let (_pool, store) = setup().await;
    let source = create_carddav_source(&store).await;
    let ab = store.upsert_addressbook(source.id(), "/ab/", "AB").await.unwrap();

    store
        .upsert_contacts_batch(
            ab.id,
            &[
                contact("/ab/1.vcf", "old@example.com", "Alice"),
                contact("/ab/2.vcf", "bob@example.com", "Bob"),
            ],
        )
        .await
        .unwrap();
    store
        .upsert_contacts_batch(ab.id, &[contact("/ab/1.vcf", "new@example.com", "Alice B")])
        .await
        .unwrap();

    let rows = store.list_contacts(ab.id).await.unwrap();
    assert_eq!(emails(&rows), vec!["bob@example.com", "new@example.com"]);
    assert_eq!(rows[1].display_name, "Alice B");
}

#[tokio::test]
async fn test_upsert_skips_invalid_rows() {
    let (_pool, store) = setup().await;
    let source = create_carddav_source(&store).await;
    let ab = store.upsert_addressbook(source.id(), "/ab/", "AB").await.unwrap();

    let report = store
        .upsert_contacts_batch(
            ab.id,
            &[
                contact("/ab/1.vcf", "", "No email"),
                contact("", "nohref@example.com", "No href"),
                contact("/ab/3.vcf", "carol@example.com", "Carol"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(report, BatchReport { written: 1, skipped: 2 });
    assert_eq!(
        emails(&store.list_contacts(ab.id).await.unwrap()),
        vec!["carol@example.com"]
    );
}

#[tokio::test]
async fn test_delete_contacts_by_hrefs() {
    let (_pool, store) = setup().await;
    let source = create_carddav_source(&store).await;
    let ab = store.upsert_addressbook(source.id(), "/ab/", "AB").await.unwrap();
    store
        .upsert_contacts_batch(
            ab.id,
            &[
                contact("/ab/a.vcf", "a@x.org", "A"),
                contact("/ab/a.vcf", "a2@x.org", "A"),
                contact("/ab/b.vcf", "b@x.org", "B"),
                contact("/ab/c.vcf", "c@x.org", "C"),
            ],
        )
        .await
        .unwrap();

    let removed = store
        .delete_contacts_by_hrefs(ab.id, &["/ab/a.vcf".to_string(), "/ab/b.vcf".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 3);
    assert_eq!(emails(&store.list_contacts(ab.id).await.unwrap()), vec!["c@x.org"]);

    assert_eq!(store.delete_contacts_by_hrefs(ab.id, &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_replace_addressbook_contacts_leaves_no_leftovers() {
    let (_pool, store) = setup().await;
    let source = create_carddav_source(&store).await;
    let ab = store.upsert_addressbook(source.id(), "/ab/", "AB").await.unwrap();
    let other = store.upsert_addressbook(source.id(), "/other/", "Other").await.unwrap();

    store
        .upsert_contacts_batch(ab.id, &[contact("/ab/stale.vcf", "stale@x.org", "Stale")])
        .await
        .unwrap();
    store
        .upsert_contacts_batch(other.id, &[contact("/other/1.vcf", "keep@x.org", "Keep")])
        .await
        .unwrap();

    let report = store
        .replace_addressbook_contacts(
            ab.id,
            &[
                contact("/ab/1.vcf", "fresh@x.org", "Fresh"),
                contact("/ab/2.vcf", "new@x.org", "New"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(report.written, 2);
    assert_eq!(
        emails(&store.list_contacts(ab.id).await.unwrap()),
        vec!["fresh@x.org", "new@x.org"]
    );
    assert_eq!(
        emails(&store.list_contacts(other.id).await.unwrap()),
        vec!["keep@x.org"]
    );

    // an empty full sync empties the addressbook
    store.replace_addressbook_contacts(ab.id, &[]).await.unwrap();
    assert!(store.list_contacts(ab.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_contacts_for_addressbook() {
    let (_pool, store) = setup().await;
    let source = create_carddav_source(&store).await;
    let ab = store.upsert_addressbook(source.id(), "/ab/", "AB").await.unwrap();
    store
        .upsert_contacts_batch(
            ab.id,
            &[contact("/ab/1.vcf", "a@x.org", "A"), contact("/ab/2.vcf", "b@x.org", "B")],
        )
        .await
        .unwrap();

    assert_eq!(store.delete_contacts_for_addressbook(ab.id).await.unwrap(), 2);
    assert!(store.list_contacts(ab.id).await.unwrap().is_empty());
}

// ============================================================================
// Synced contact search
// ============================================================================

#[tokio::test]
async fn test_synced_searcher_labels_and_filters_disabled() {
    let (pool, store) = setup().await;
    let carddav = create_carddav_source(&store).await;
    let ab = store.upsert_addressbook(carddav.id(), "/ab/", "AB").await.unwrap();
    store
        .upsert_contacts_batch(ab.id, &[contact("/ab/1.vcf", "alice@example.com", "Alice")])
        .await
        .unwrap();

    let mut google = ContactSource::oauth("Gmail", SourceType::Google, None);
    store.create_source(&google).await.unwrap();
    let gab = store
        .get_or_create_addressbook(google.id(), VIRTUAL_ADDRESSBOOK_PATH, "Google")
        .await
        .unwrap();
    store
        .upsert_contacts_batch(
            gab.id,
            &[ParsedContact::new("people/c1", "", "alicia@gmail.com", "Alicia")],
        )
        .await
        .unwrap();

    let searcher = SyncedContactSearcher::new(pool.pool().clone());
    let results = searcher.search("ali", 10).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].email, "alice@example.com");
    assert_eq!(results[0].source, SuggestionSource::CardDav);
    assert_eq!(results[1].source, SuggestionSource::Google);

    google.set_enabled(false);
    store.update_source(&google).await.unwrap();
    let results = searcher.search("ali", 10).await.unwrap();
    assert_eq!(results.len(), 1);

    // LIKE wildcards in the query are literal
    assert!(searcher.search("%", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_synced_searcher_limit_counts_distinct_addresses() {
    let (pool, store) = setup().await;
    let source = create_carddav_source(&store).await;
    let home = store.upsert_addressbook(source.id(), "/home/", "Home").await.unwrap();
    let work = store.upsert_addressbook(source.id(), "/work/", "Work").await.unwrap();

    store
        .upsert_contacts_batch(home.id, &[contact("/home/a.vcf", "anna@example.com", "Anna")])
        .await
        .unwrap();
    store
        .upsert_contacts_batch(
            work.id,
            &[
                contact("/work/a.vcf", "anna@example.com", "Anna K."),
                contact("/work/b.vcf", "anton@example.com", "Anton"),
            ],
        )
        .await
        .unwrap();

    let searcher = SyncedContactSearcher::new(pool.pool().clone());
    let results = searcher.search("an", 2).await.unwrap();
    let found: Vec<&str> = results.iter().map(|s| s.email.as_str()).collect();
    assert_eq!(found, vec!["anna@example.com", "anton@example.com"]);
}

// ============================================================================
// Local send history
// ============================================================================

#[tokio::test]
async fn test_record_sent_accumulates() {
    let (pool, _store) = setup().await;
    let local = SqliteLocalContactStore::new(pool.pool().clone());

    let first = local.record_sent("Alice@Example.com", "Alice").await.unwrap();
    assert_eq!(first.email, "alice@example.com");
    assert_eq!(first.send_count, 1);

    let second = local.record_sent("alice@example.com", "").await.unwrap();
    assert_eq!(second.send_count, 2);
    // an empty name keeps the stored one
    assert_eq!(second.display_name, "Alice");
    assert!(second.last_used >= first.last_used);

    assert!(local.record_sent("not-an-email", "X").await.is_err());
}

#[tokio::test]
async fn test_local_search_ordering() {
    let (pool, _store) = setup().await;
    let local = SqliteLocalContactStore::new(pool.pool().clone());
    let base = Utc::now() - Duration::hours(3);

    local.record_sent_at("ann@x.org", "Ann", base).await.unwrap();
    local
        .record_sent_at("andy@x.org", "Andy", base + Duration::hours(1))
        .await
        .unwrap();
    for i in 0..3 {
        local
            .record_sent_at("anna@x.org", "Anna", base + Duration::minutes(i))
            .await
            .unwrap();
    }
    local.record_sent_at("zed@x.org", "Zed", base).await.unwrap();

    let results = local.search("an", 10).await.unwrap();
    let order: Vec<&str> = results.iter().map(|c| c.email.as_str()).collect();
    // count first, then most recent
    assert_eq!(order, vec!["anna@x.org", "andy@x.org", "ann@x.org"]);

    let limited = local.search("an", 1).await.unwrap();
    assert_eq!(limited.len(), 1);

    let by_name = local.search("ZED", 10).await.unwrap();
    assert_eq!(by_name.len(), 1);
}

#[tokio::test]
async fn test_local_delete_and_list() {
    let (pool, _store) = setup().await;
    let local = SqliteLocalContactStore::new(pool.pool().clone());
    local.record_sent("a@x.org", "A").await.unwrap();
    local.record_sent("b@x.org", "B").await.unwrap();

    assert!(local.delete("A@X.org").await.unwrap());
    assert!(!local.delete("a@x.org").await.unwrap());

    let all = local.list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].email, "b@x.org");
}
