//! Shared HTTP plumbing
//!
//! All clients go through a `reqwest::Client` built here so timeouts and the
//! user agent come from one [`HttpConfig`] section. WebDAV clients disable
//! automatic redirects: PROPFIND/REPORT must be replayed with their method
//! and body, which [`crate::carddav`] does by hand.

use std::time::Duration;

use addrsync_core::config::HttpConfig;
use reqwest::{redirect, Client, Response, StatusCode};

use crate::RemoteError;

/// Maximum number of body bytes kept in [`RemoteError::Http`]
const MAX_ERROR_BODY: usize = 512;

/// Client construction parameters
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_redirects: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for HttpSettings {
    fn from(config: &HttpConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            user_agent: config.user_agent.clone(),
            max_redirects: config.max_redirects,
        }
    }
}

impl HttpSettings {
    /// Client for JSON REST APIs; follows redirects automatically
    pub fn rest_client(&self) -> Result<Client, RemoteError> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .redirect(redirect::Policy::limited(self.max_redirects as usize))
            .build()
            .map_err(|e| RemoteError::Configuration(format!("Failed to build HTTP client: {e}")))
    }

    /// Client for WebDAV; redirects are surfaced to the caller
    pub fn webdav_client(&self) -> Result<Client, RemoteError> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| RemoteError::Configuration(format!("Failed to build HTTP client: {e}")))
    }
}

/// Passes 2xx responses through and maps everything else to a [`RemoteError`]
pub(crate) async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(error_from_response(response).await)
}

/// Consumes a failed response into a [`RemoteError`]
pub(crate) async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status();
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteError::Unauthorized(format!("{status} from {url}"))
        }
        _ => RemoteError::Http {
            status: status.as_u16(),
            body: truncate(&body),
        },
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
