//! Addressbook discovery
//!
//! Tries a list of candidate URLs in order: the configured URL, the
//! `/.well-known/carddav` bootstrap (RFC 6764) and a few conventional
//! server paths. For each candidate: find the `current-user-principal`,
//! ask it for `addressbook-home-set`, then list the home set with Depth 1
//! and keep the collections whose resource type is `addressbook`.

use addrsync_core::domain::DiscoveredAddressbook;
use tracing::{debug, info};
use url::Url;

use super::{xml, CardDavClient};
use crate::RemoteError;

/// Paths used by common servers (Nextcloud, Baikal, SOGo, Radicale ...)
const CONVENTIONAL_PATHS: &[&str] = &[
    "/remote.php/dav/",
    "/dav.php/",
    "/SOGo/dav/",
    "/carddav/",
    "/dav/",
];

/// Candidate URLs for discovery, deduplicated, configured URL first
pub fn candidate_urls(configured: &Url) -> Vec<Url> {
    let mut candidates = vec![configured.clone()];
    let extra = std::iter::once("/.well-known/carddav").chain(CONVENTIONAL_PATHS.iter().copied());
    for path in extra {
        if let Ok(url) = configured.join(path) {
            if !candidates.contains(&url) {
                candidates.push(url);
            }
        }
    }
    candidates
}

impl CardDavClient {
    /// Finds the addressbooks visible to the configured user
    ///
    /// Rejected credentials abort immediately; other failures move on to the
    /// next candidate.
    pub async fn discover(&self) -> Result<Vec<DiscoveredAddressbook>, RemoteError> {
        let mut last_error: Option<RemoteError> = None;

        for candidate in candidate_urls(self.base_url()) {
            match self.discover_from(&candidate).await {
                Ok(books) if !books.is_empty() => {
                    info!(url = %candidate, count = books.len(), "Discovered addressbooks");
                    return Ok(books);
                }
                Ok(_) => debug!(url = %candidate, "No addressbooks at candidate"),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    debug!(url = %candidate, error = %e, "Discovery candidate failed");
                    last_error = Some(e);
                }
            }
        }

        let detail = last_error
            .map(|e| format!(" (last error: {e})"))
            .unwrap_or_default();
        Err(RemoteError::Discovery(format!(
            "no addressbooks found for {}{detail}",
            self.base_url()
        )))
    }

    async fn discover_from(&self, candidate: &Url) -> Result<Vec<DiscoveredAddressbook>, RemoteError> {
        let principal = self
            .find_principal(candidate)
            .await?
            .unwrap_or_else(|| candidate.clone());

        let mut homes = self.find_home_sets(&principal).await?;
        if homes.is_empty() {
            // the candidate may already be a home set or an addressbook
            homes.push(candidate.clone());
        }

        let mut books: Vec<DiscoveredAddressbook> = Vec::new();
        for home in homes {
            for book in self.list_addressbooks(&home).await? {
                if !books.iter().any(|b| b.path == book.path) {
                    books.push(book);
                }
            }
        }
        Ok(books)
    }

    async fn find_principal(&self, url: &Url) -> Result<Option<Url>, RemoteError> {
        let reply = self
            .dav_request(
                "PROPFIND",
                url.clone(),
                "0",
                xml::propfind_current_user_principal(),
            )
            .await?;
        let multistatus = xml::parse_multistatus(&reply.body)?;

        let principal = multistatus
            .responses
            .iter()
            .find_map(|r| r.current_user_principal.as_deref())
            .and_then(|href| reply.url.join(href).ok());
        debug!(url = %reply.url, principal = ?principal.as_ref().map(Url::as_str), "Principal lookup");
        Ok(principal)
    }

    async fn find_home_sets(&self, principal: &Url) -> Result<Vec<Url>, RemoteError> {
        let reply = self
            .dav_request(
                "PROPFIND",
                principal.clone(),
                "0",
                xml::propfind_addressbook_home_set(),
            )
            .await?;
        let multistatus = xml::parse_multistatus(&reply.body)?;

        Ok(multistatus
            .responses
            .iter()
            .flat_map(|r| r.addressbook_home_sets.iter())
            .filter_map(|href| reply.url.join(href).ok())
            .collect())
    }

    async fn list_addressbooks(&self, home: &Url) -> Result<Vec<DiscoveredAddressbook>, RemoteError> {
        let reply = self
            .dav_request("PROPFIND", home.clone(), "1", xml::propfind_collections())
            .await?;
        let multistatus = xml::parse_multistatus(&reply.body)?;

        let mut books = Vec::new();
        for response in multistatus.responses.into_iter().filter(|r| r.is_addressbook) {
            let url = reply.url.join(&response.href).map_err(|e| {
                RemoteError::InvalidResponse(format!("Bad href '{}': {e}", response.href))
            })?;
            let path = self.collection_path(&url);
            let display_name = response
                .display_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| fallback_name(&path));
            books.push(DiscoveredAddressbook { path, display_name });
        }
        Ok(books)
    }
}

/// Last non-empty path segment, used when a collection has no displayname
fn fallback_name(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(path)
        .to_string()
}
