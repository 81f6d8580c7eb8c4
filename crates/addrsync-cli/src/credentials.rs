//! Keyring-backed credentials
//!
//! Secrets live in the system keyring under the service `addrsync`:
//!
//! - `carddav:<source id>` - CardDAV password
//! - `oauth:<owner>` - current OAuth access token, keyed by linked account
//!   or source ID
//!
//! Token acquisition and refresh happen elsewhere; this store only hands out
//! whatever token was last saved.

use anyhow::{Context, Result};
use addrsync_core::ports::ICredentialProvider;
use tracing::{debug, info};

const KEYRING_SERVICE: &str = "addrsync";

/// [`ICredentialProvider`] over the system keyring
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringCredentials;

impl KeyringCredentials {
    pub fn save_carddav_password(&self, source_id: &str, password: &str) -> Result<()> {
        set(&carddav_user(source_id), password)?;
        info!(source_id, "Stored CardDAV password in keyring");
        Ok(())
    }

    pub fn save_access_token(&self, owner_id: &str, token: &str) -> Result<()> {
        set(&oauth_user(owner_id), token)?;
        info!(owner_id, "Stored access token in keyring");
        Ok(())
    }

    /// Removes every secret stored for a source
    pub fn forget_source(&self, source_id: &str, owner_id: &str) -> Result<()> {
        delete(&carddav_user(source_id))?;
        delete(&oauth_user(owner_id))
    }
}

#[async_trait::async_trait]
impl ICredentialProvider for KeyringCredentials {
    async fn access_token(&self, owner_id: &str) -> Result<String> {
        get(&oauth_user(owner_id))?
            .with_context(|| format!("No access token stored for {owner_id}"))
    }

    async fn carddav_password(&self, source_id: &str) -> Result<String> {
        get(&carddav_user(source_id))?
            .with_context(|| format!("No CardDAV password stored for source {source_id}"))
    }
}

fn carddav_user(source_id: &str) -> String {
    format!("carddav:{source_id}")
}

fn oauth_user(owner_id: &str) -> String {
    format!("oauth:{owner_id}")
}

fn set(user: &str, secret: &str) -> Result<()> {
    keyring::Entry::new(KEYRING_SERVICE, user)
        .context("Failed to create keyring entry")?
        .set_password(secret)
        .context("Failed to store secret in keyring")
}

fn get(user: &str) -> Result<Option<String>> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, user).context("Failed to create keyring entry")?;
    match entry.get_password() {
        Ok(secret) => Ok(Some(secret)),
        Err(keyring::Error::NoEntry) => {
            debug!(user, "No secret found in keyring");
            Ok(None)
        }
        Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
    }
}

fn delete(user: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, user).context("Failed to create keyring entry")?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyring_user_names() {
        assert_eq!(carddav_user("abc"), "carddav:abc");
        assert_eq!(oauth_user("me@example.com"), "oauth:me@example.com");
    }
}
