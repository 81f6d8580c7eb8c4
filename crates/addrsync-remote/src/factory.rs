//! Provider construction from configuration
//!
//! HTTP clients are built once and shared by every protocol client the
//! factory hands out.

use std::sync::Arc;

use addrsync_core::config::Config;
use addrsync_core::ports::{ICardDavProvider, IContactProvider, IProviderFactory};
use reqwest::Client;

use crate::carddav::CardDavClient;
use crate::google::{GoogleContactsClient, PEOPLE_BASE_URL};
use crate::http::HttpSettings;
use crate::microsoft::{MicrosoftContactsClient, GRAPH_BASE_URL};
use crate::RemoteError;

/// [`IProviderFactory`] backed by the clients of this crate
pub struct ProviderFactory {
    rest: Client,
    webdav: Client,
    max_redirects: u32,
    google_base_url: String,
    microsoft_base_url: String,
    google_page_size: u32,
}

impl ProviderFactory {
    /// Creates a factory with the public provider endpoints
    pub fn new(settings: &HttpSettings) -> Result<Self, RemoteError> {
        Ok(Self {
            rest: settings.rest_client()?,
            webdav: settings.webdav_client()?,
            max_redirects: settings.max_redirects,
            google_base_url: PEOPLE_BASE_URL.to_string(),
            microsoft_base_url: GRAPH_BASE_URL.to_string(),
            google_page_size: 1000,
        })
    }

    /// Creates a factory from the `http` and `providers` config sections
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        Ok(Self::new(&HttpSettings::from(&config.http))?
            .with_google_base_url(&config.providers.google_base_url)
            .with_microsoft_base_url(&config.providers.microsoft_base_url)
            .with_google_page_size(config.providers.google_page_size))
    }

    pub fn with_google_base_url(mut self, url: impl Into<String>) -> Self {
        self.google_base_url = url.into();
        self
    }

    pub fn with_microsoft_base_url(mut self, url: impl Into<String>) -> Self {
        self.microsoft_base_url = url.into();
        self
    }

    pub fn with_google_page_size(mut self, page_size: u32) -> Self {
        self.google_page_size = page_size;
        self
    }
}

impl IProviderFactory for ProviderFactory {
    fn carddav(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Arc<dyn ICardDavProvider>> {
        let client = CardDavClient::with_client(
            url,
            username,
            password,
            self.webdav.clone(),
            self.max_redirects,
        )?;
        Ok(Arc::new(client))
    }

    fn google(&self, access_token: &str) -> anyhow::Result<Arc<dyn IContactProvider>> {
        let client =
            GoogleContactsClient::with_client(self.rest.clone(), access_token, &self.google_base_url)
                .with_page_size(self.google_page_size);
        Ok(Arc::new(client))
    }

    fn microsoft(&self, access_token: &str) -> anyhow::Result<Arc<dyn IContactProvider>> {
        let client = MicrosoftContactsClient::with_client(
            self.rest.clone(),
            access_token,
            &self.microsoft_base_url,
        );
        Ok(Arc::new(client))
    }
}
