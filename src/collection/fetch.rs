//! Outbound HTTP fetch seam.
//!
//! Population issues many small fetches against the hosting API. The
//! [`Fetch`] trait separates the population algorithm from reqwest so
//! tests can script statuses and bodies per url.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// A transport-level fetch failure (timeout, connection error).
///
/// Non-2xx responses are not errors at this layer; they come back as a
/// [`FetchResponse`] carrying the status.
#[derive(Debug, Error)]
#[error("fetch {url} failed: {message}")]
pub struct FetchError {
    pub url: String,
    pub message: String,
}

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// A completed HTTP response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Whether the response carries a 2xx status.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An outbound HTTP GET.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// Hosting-API client credential, appended to request urls as query
/// parameters for a higher rate limit.
#[derive(Debug, Clone)]
pub struct ClientCredential {
    pub client_id: String,
    pub client_secret: String,
}

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// [`Fetch`] implementation over reqwest.
///
/// Every request carries a network-level timeout; a timed-out fetch is
/// a [`FetchError`] and is treated by callers exactly like a non-200
/// response.
pub struct ReqwestFetcher {
    client: Client,
    timeout: Duration,
    credential: Option<ClientCredential>,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: FETCH_TIMEOUT,
            credential: None,
        }
    }

    pub fn with_credential(mut self, credential: Option<ClientCredential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url_with_credential(&self, url: &str) -> String {
        match &self.credential {
            Some(cred) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                format!(
                    "{}{}client_id={}&client_secret={}",
                    url, sep, cred.client_id, cred.client_secret
                )
            }
            None => url.to_string(),
        }
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetch for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let full_url = self.url_with_credential(url);
        let response = self
            .client
            .get(&full_url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError {
                url: url.to_string(),
                message: e.to_string(),
            })?
            .to_vec();

        Ok(FetchResponse { status, body })
    }
}
