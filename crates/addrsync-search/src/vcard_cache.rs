//! Filesystem vCard cache
//!
//! Scans directories recursively for `.vcf` files and keeps the parsed
//! addresses in memory.
//!
//! ## Freshness
//!
//! - No snapshot yet, or older than the TTL: rescan before answering
//! - Older than half the TTL: answer from the snapshot and rescan in the
//!   background (at most one background rescan at a time)
//! - Otherwise: answer from the snapshot

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use addrsync_core::config::AutocompleteConfig;
use addrsync_core::domain::{ContactSuggestion, SuggestionSource};
use addrsync_core::ports::IContactSearcher;
use addrsync_core::vcard::parse_vcards;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::SearchError;

/// One address found in a vCard file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VCardEntry {
    pub email: String,
    pub display_name: String,
}

#[derive(Debug)]
struct Snapshot {
    entries: Arc<Vec<VCardEntry>>,
    scanned_at: Instant,
}

struct Inner {
    dirs: Vec<PathBuf>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
    refreshing: AtomicBool,
}

/// TTL-cached index of local vCard files
#[derive(Clone)]
pub struct VCardCache {
    inner: Arc<Inner>,
}

impl VCardCache {
    pub fn new(dirs: Vec<PathBuf>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                dirs,
                ttl,
                snapshot: RwLock::new(None),
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_config(config: &AutocompleteConfig) -> Self {
        Self::new(
            config.vcard_dirs.clone(),
            Duration::from_secs(config.vcard_ttl_secs),
        )
    }

    /// Rescans now, regardless of age
    pub async fn refresh(&self) -> Result<usize, SearchError> {
        Ok(self.inner.rescan().await?.len())
    }

    /// Returns true while a background rescan is running
    pub fn is_refreshing(&self) -> bool {
        self.inner.refreshing.load(Ordering::SeqCst)
    }

    /// Entries to answer from, rescanning according to the freshness rules
    async fn entries(&self) -> Result<Arc<Vec<VCardEntry>>, SearchError> {
        let current = {
            let guard = self.inner.snapshot.read().await;
            guard
                .as_ref()
                .map(|s| (Arc::clone(&s.entries), s.scanned_at.elapsed()))
        };

        match current {
            Some((entries, age)) if age < self.inner.ttl => {
                if age >= self.inner.ttl / 2 {
                    self.spawn_background_refresh();
                }
                Ok(entries)
            }
            _ => self.inner.rescan().await,
        }
    }

    fn spawn_background_refresh(&self) {
        if self
            .inner
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.rescan().await {
                warn!(error = %e, "Background vCard rescan failed");
            }
            inner.refreshing.store(false, Ordering::SeqCst);
        });
    }
}

impl Inner {
    async fn rescan(&self) -> Result<Arc<Vec<VCardEntry>>, SearchError> {
        let dirs = self.dirs.clone();
        let entries = tokio::task::spawn_blocking(move || scan_dirs(&dirs))
            .await
            .map_err(|e| SearchError::Scan(e.to_string()))?;
        let entries = Arc::new(entries);

        *self.snapshot.write().await = Some(Snapshot {
            entries: Arc::clone(&entries),
            scanned_at: Instant::now(),
        });
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl IContactSearcher for VCardCache {
    fn name(&self) -> &str {
        "vcard"
    }

    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<ContactSuggestion>> {
        let needle = query.trim().to_lowercase();
        let entries = self.entries().await?;

        Ok(entries
            .iter()
            .filter(|e| {
                e.email.contains(&needle) || e.display_name.to_lowercase().contains(&needle)
            })
            .take(limit)
            .map(|e| ContactSuggestion::new(&e.email, e.display_name.clone(), SuggestionSource::VCard))
            .collect())
    }
}

// ============================================================================
// Scanning
// ============================================================================

/// Reads every `.vcf` file under `dirs`; unreadable paths are logged and skipped
fn scan_dirs(dirs: &[PathBuf]) -> Vec<VCardEntry> {
    let start = Instant::now();
    let mut files = Vec::new();
    for dir in dirs {
        collect_vcf(dir, &mut files);
    }
    files.sort();

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for path in &files {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable vCard file");
                continue;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        for card in parse_vcards(&text) {
            let display_name = card.display_name();
            for email in card.emails {
                if seen.insert(email.clone()) {
                    entries.push(VCardEntry {
                        email,
                        display_name: display_name.clone(),
                    });
                }
            }
        }
    }

    debug!(
        files = files.len(),
        entries = entries.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Scanned vCard directories"
    );
    entries
}

fn collect_vcf(dir: &Path, files: &mut Vec<PathBuf>) {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot read vCard directory");
            return;
        }
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_vcf(&path, files);
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("vcf"))
        {
            files.push(path);
        }
    }
}
