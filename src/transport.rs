//! Injected HTTP transport for realm discovery, MEX retrieval and the
//! WS-Trust exchange.
//!
//! The core never talks to the network directly; every outbound call goes
//! through a [`Transport`] so callers can supply their own client (timeouts,
//! proxies, retry policy) or a stub in tests. [`HttpTransport`] is the
//! default reqwest-backed implementation.

use async_trait::async_trait;
use url::Url;

use crate::errors::{AuthError, Result};

/// Content type for SOAP 1.2 requests.
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Minimal fetch capability consumed by the token-acquisition core.
///
/// Each method performs exactly one round trip. Timeouts and retries are the
/// implementation's concern, not the core's.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a single GET and return the response body as text.
    async fn get(&self, url: &Url) -> Result<String>;

    /// Issue a single SOAP POST carrying the given WS-Addressing action.
    async fn post_soap(&self, url: &Url, action: &str, body: String) -> Result<String>;
}

/// Rejects any scheme other than `https`. MEX retrieval and WS-Trust
/// negotiation are never permitted over plaintext transport.
pub fn require_https(url: &Url) -> Result<()> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(AuthError::configuration(format!(
            "'{url}' is not an https URL; refusing plaintext transport"
        )))
    }
}

/// Default transport backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport from an existing client, keeping its connection
    /// pool and timeout settings.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn post_soap(&self, url: &Url, action: &str, body: String) -> Result<String> {
        let response = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header("SOAPAction", action)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}
