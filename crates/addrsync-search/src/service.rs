//! Autocomplete service
//!
//! Fans a query out to the send-history store and every registered
//! [`IContactSearcher`], then merges the answers with [`merge_results`].

use std::sync::Arc;

use addrsync_core::domain::{ContactSuggestion, Email, LocalContact};
use addrsync_core::ports::{IContactSearcher, ILocalContactStore};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::merge::merge_results;
use crate::SearchError;

/// Entry point for recipient autocomplete
pub struct AutocompleteService {
    local: Arc<dyn ILocalContactStore>,
    searchers: Vec<Arc<dyn IContactSearcher>>,
    default_limit: usize,
}

impl AutocompleteService {
    /// Creates a service over the send-history store and the given backends
    pub fn new(
        local: Arc<dyn ILocalContactStore>,
        searchers: Vec<Arc<dyn IContactSearcher>>,
        default_limit: usize,
    ) -> Self {
        Self {
            local,
            searchers,
            default_limit,
        }
    }

    /// Registers another backend
    pub fn with_searcher(mut self, searcher: Arc<dyn IContactSearcher>) -> Self {
        self.searchers.push(searcher);
        self
    }

    /// Ranked suggestions for `query`
    ///
    /// `limit` of `None` uses the configured default. A backend that fails is
    /// logged and left out; only a failing send-history store fails the call.
    #[tracing::instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ContactSuggestion>, SearchError> {
        let limit = limit.unwrap_or(self.default_limit);
        let query = query.trim();
        if limit == 0 {
            return Ok(Vec::new());
        }

        let local = async {
            self.local
                .search(query, limit)
                .await
                .map(|rows| rows.into_iter().map(ContactSuggestion::from).collect::<Vec<_>>())
        };
        let backends = join_all(self.searchers.iter().map(|s| s.search(query, limit)));
        let (local, backends) = tokio::join!(local, backends);

        let mut lists = vec![local.map_err(|e| SearchError::Store(format!("{e:#}")))?];
        for (searcher, result) in self.searchers.iter().zip(backends) {
            match result {
                Ok(found) => {
                    debug!(searcher = searcher.name(), count = found.len(), "Searcher answered");
                    lists.push(found);
                }
                Err(e) => warn!(searcher = searcher.name(), error = %e, "Searcher failed, skipping"),
            }
        }

        Ok(merge_results(lists, limit))
    }

    /// Learns a recipient from outgoing mail
    pub async fn record_sent(
        &self,
        email: &str,
        display_name: &str,
    ) -> Result<LocalContact, SearchError> {
        let email = Email::new(email).map_err(|e| SearchError::InvalidEmail(e.to_string()))?;
        let contact = self
            .local
            .record_sent(email.as_str(), display_name.trim())
            .await
            .map_err(|e| SearchError::Store(format!("{e:#}")))?;
        debug!(email = %contact.email, send_count = contact.send_count, "Recorded recipient");
        Ok(contact)
    }

    /// Removes a learned recipient; returns false if it was unknown
    pub async fn forget(&self, email: &str) -> Result<bool, SearchError> {
        let email = Email::new(email).map_err(|e| SearchError::InvalidEmail(e.to_string()))?;
        let removed = self
            .local
            .delete(email.as_str())
            .await
            .map_err(|e| SearchError::Store(format!("{e:#}")))?;
        if removed {
            info!(email = %email, "Forgot recipient");
        }
        Ok(removed)
    }

    /// All learned recipients in ranking order
    pub async fn list_local(&self) -> Result<Vec<LocalContact>, SearchError> {
        self.local
            .list()
            .await
            .map_err(|e| SearchError::Store(format!("{e:#}")))
    }
}
