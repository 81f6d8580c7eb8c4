//! Contact source domain entity
//!
//! A [`ContactSource`] is one configured provider of contacts: a CardDAV
//! server, a Google account or a Microsoft account. It carries the
//! connection details (never the password) and the outcome of the last
//! synchronization attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{errors::DomainError, newtypes::SourceId};

/// Kind of remote system a source talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// WebDAV/CardDAV server with HTTP Basic authentication
    CardDav,
    /// Google People API with an OAuth bearer token
    Google,
    /// Microsoft Graph contacts with an OAuth bearer token
    Microsoft,
}

impl SourceType {
    /// Stable string stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::CardDav => "carddav",
            SourceType::Google => "google",
            SourceType::Microsoft => "microsoft",
        }
    }

    /// Returns true for the OAuth-backed providers
    pub fn is_oauth(&self) -> bool {
        matches!(self, SourceType::Google | SourceType::Microsoft)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "carddav" => Ok(SourceType::CardDav),
            "google" => Ok(SourceType::Google),
            "microsoft" | "outlook" => Ok(SourceType::Microsoft),
            other => Err(DomainError::UnknownSourceType(other.to_string())),
        }
    }
}

/// A configured contact provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSource {
    id: SourceId,
    name: String,
    source_type: SourceType,
    /// Server URL (CardDAV only)
    url: Option<String>,
    /// Login name (CardDAV only)
    username: Option<String>,
    /// Email account this source is tied to (OAuth only, unique across sources)
    linked_account_id: Option<String>,
    enabled: bool,
    /// Minutes between scheduled syncs; 0 means manual only
    sync_interval_minutes: u32,
    last_synced_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ContactSource {
    /// Creates a CardDAV source
    pub fn carddav(
        name: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        let mut source = Self::with_id(
            SourceId::new(),
            name,
            SourceType::CardDav,
            Utc::now(),
        );
        source.url = Some(url.into());
        source.username = Some(username.into());
        source
    }

    /// Creates an OAuth-backed source (Google or Microsoft)
    pub fn oauth(
        name: impl Into<String>,
        source_type: SourceType,
        linked_account_id: Option<String>,
    ) -> Self {
        let mut source = Self::with_id(SourceId::new(), name, source_type, Utc::now());
        source.linked_account_id = linked_account_id;
        source
    }

    /// Creates a source with a specific ID (for reconstitution from storage)
    pub fn with_id(
        id: SourceId,
        name: impl Into<String>,
        source_type: SourceType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            source_type,
            url: None,
            username: None,
            linked_account_id: None,
            enabled: true,
            sync_interval_minutes: 0,
            last_synced_at: None,
            last_error: None,
            last_error_at: None,
            created_at,
        }
    }

    // --- Getters ---

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn linked_account_id(&self) -> Option<&str> {
        self.linked_account_id.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn sync_interval_minutes(&self) -> u32 {
        self.sync_interval_minutes
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_error_at(&self) -> Option<DateTime<Utc>> {
        self.last_error_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // --- Setters ---

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_url(&mut self, url: Option<String>) {
        self.url = url;
    }

    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    pub fn set_linked_account_id(&mut self, account: Option<String>) {
        self.linked_account_id = account;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_sync_interval_minutes(&mut self, minutes: u32) {
        self.sync_interval_minutes = minutes;
    }

    /// Restores persisted sync status fields
    pub fn restore_status(
        &mut self,
        last_synced_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
        last_error_at: Option<DateTime<Utc>>,
    ) {
        self.last_synced_at = last_synced_at;
        self.last_error = last_error.filter(|e| !e.is_empty());
        self.last_error_at = last_error_at;
    }

    // --- Status transitions ---

    /// Records a successful sync: clears the error and advances `last_synced_at`
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_synced_at = Some(at);
        self.last_error = None;
        self.last_error_at = None;
    }

    /// Records a failed sync; `last_synced_at` is left untouched
    pub fn record_failure(&mut self, message: impl Into<String>, at: DateTime<Utc>) {
        self.last_error = Some(message.into());
        self.last_error_at = Some(at);
    }

    /// Returns true when the last sync attempt failed
    pub fn has_error(&self) -> bool {
        self.last_error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Key used to look up the OAuth access token
    ///
    /// The linked email account when present, otherwise the source ID.
    pub fn credential_owner(&self) -> String {
        match self.linked_account_id.as_deref() {
            Some(account) if !account.is_empty() => account.to_string(),
            _ => self.id.to_string(),
        }
    }

    /// Checks that the configuration is complete for the source type
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidSourceConfig`] or [`DomainError::InvalidUrl`]
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidSourceConfig(
                "name must not be empty".to_string(),
            ));
        }

        match self.source_type {
            SourceType::CardDav => {
                let raw = self.url.as_deref().map(str::trim).unwrap_or("");
                if raw.is_empty() {
                    return Err(DomainError::InvalidSourceConfig(
                        "CardDAV source requires a server URL".to_string(),
                    ));
                }
                let parsed = url::Url::parse(raw)
                    .map_err(|e| DomainError::InvalidUrl(format!("{raw}: {e}")))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(DomainError::InvalidUrl(format!(
                        "{raw}: scheme must be http or https"
                    )));
                }
                if self.username.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(DomainError::InvalidSourceConfig(
                        "CardDAV source requires a username".to_string(),
                    ));
                }
            }
            SourceType::Google | SourceType::Microsoft => {
                if self.url.is_some() {
                    return Err(DomainError::InvalidSourceConfig(format!(
                        "{} source does not take a server URL",
                        self.source_type
                    )));
                }
            }
        }

        Ok(())
    }
}
