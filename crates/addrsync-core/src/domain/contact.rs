//! Addressbooks, contacts and autocomplete suggestions
//!
//! Contact rows are deliberately flat: one row per `(addressbook, href,
//! email)`. A remote record with several addresses expands into several
//! rows sharing `href` and `etag`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{normalize_email, AddressbookId, SourceId};
use super::source::SourceType;

/// Path of the single virtual addressbook held by OAuth sources
pub const VIRTUAL_ADDRESSBOOK_PATH: &str = "/";

/// A syncable collection of contacts within a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addressbook {
    pub id: AddressbookId,
    pub source_id: SourceId,
    /// Server path for CardDAV, [`VIRTUAL_ADDRESSBOOK_PATH`] for OAuth
    pub path: String,
    pub display_name: String,
    /// Opaque provider checkpoint; empty means the next sync is full
    pub sync_token: String,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Addressbook {
    /// Returns true when no checkpoint is stored
    pub fn needs_full_sync(&self) -> bool {
        self.sync_token.is_empty()
    }
}

/// A collection found during CardDAV discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredAddressbook {
    /// Absolute path on the server
    pub path: String,
    pub display_name: String,
}

/// Protocol-neutral contact row produced by the protocol clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedContact {
    /// CardDAV resource path or OAuth provider resource id
    pub href: String,
    /// Change token; empty for OAuth providers
    pub etag: String,
    pub email: String,
    pub display_name: String,
}

impl ParsedContact {
    /// Builds a row, normalizing the email address
    pub fn new(
        href: impl Into<String>,
        etag: impl Into<String>,
        email: &str,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            href: href.into(),
            etag: etag.into(),
            email: normalize_email(email),
            display_name: display_name.into(),
        }
    }

    /// Rows with an empty href or email cannot be stored
    pub fn is_storable(&self) -> bool {
        !self.href.trim().is_empty() && !self.email.is_empty()
    }
}

/// A contact row as persisted in the synced-contacts table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedContact {
    pub id: i64,
    pub addressbook_id: AddressbookId,
    pub href: String,
    pub etag: String,
    pub email: String,
    pub display_name: String,
    pub updated_at: DateTime<Utc>,
}

/// Locally learned recipient from outgoing mail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalContact {
    /// Lowercased address, primary key
    pub email: String,
    pub display_name: String,
    pub send_count: i64,
    pub last_used: DateTime<Utc>,
}

/// Which backend produced a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Local,
    VCard,
    CardDav,
    Google,
    Microsoft,
    Other,
}

impl SuggestionSource {
    /// Tie-break priority when the same address comes from several backends
    pub fn priority(&self) -> u8 {
        match self {
            SuggestionSource::Local => 4,
            SuggestionSource::VCard => 3,
            SuggestionSource::CardDav => 2,
            SuggestionSource::Google => 1,
            SuggestionSource::Microsoft | SuggestionSource::Other => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionSource::Local => "local",
            SuggestionSource::VCard => "vcard",
            SuggestionSource::CardDav => "carddav",
            SuggestionSource::Google => "google",
            SuggestionSource::Microsoft => "microsoft",
            SuggestionSource::Other => "other",
        }
    }
}

impl From<SourceType> for SuggestionSource {
    fn from(ty: SourceType) -> Self {
        match ty {
            SourceType::CardDav => SuggestionSource::CardDav,
            SourceType::Google => SuggestionSource::Google,
            SourceType::Microsoft => SuggestionSource::Microsoft,
        }
    }
}

impl std::fmt::Display for SuggestionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One autocomplete result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSuggestion {
    pub email: String,
    pub display_name: String,
    pub source: SuggestionSource,
    pub send_count: i64,
    pub last_used: Option<DateTime<Utc>>,
}

impl ContactSuggestion {
    pub fn new(
        email: &str,
        display_name: impl Into<String>,
        source: SuggestionSource,
    ) -> Self {
        Self {
            email: normalize_email(email),
            display_name: display_name.into(),
            source,
            send_count: 0,
            last_used: None,
        }
    }

    /// Sets usage statistics (local history only)
    pub fn with_usage(mut self, send_count: i64, last_used: DateTime<Utc>) -> Self {
        self.send_count = send_count;
        self.last_used = Some(last_used);
        self
    }
}

impl From<LocalContact> for ContactSuggestion {
    fn from(contact: LocalContact) -> Self {
        Self {
            email: contact.email,
            display_name: contact.display_name,
            source: SuggestionSource::Local,
            send_count: contact.send_count,
            last_used: Some(contact.last_used),
        }
    }
}
