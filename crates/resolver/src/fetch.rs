use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, trace};
use url::Url;

use crate::error::TransportError;

pub const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// One page fetch issued by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: Url,
    pub referer: Option<String>,
    pub origin: Option<String>,
}

impl PageRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            referer: None,
            origin: None,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// A successful (2xx) page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    /// Final URL after redirects.
    pub url: Url,
    pub body: String,
}

/// Network capability the resolver is driven by.
///
/// Implementations report non-2xx answers as [`TransportError::Status`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: PageRequest) -> Result<PageResponse, TransportError>;
}

/// [`PageFetcher`] backed by `reqwest`.
pub struct HttpPageFetcher {
    client: Client,
    headers: HeaderMap,
    timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new(client: Client) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(DEFAULT_UA));
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.8,it;q=0.5"),
        );
        Self {
            client,
            headers,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a header sent with every request. Invalid names or values are skipped.
    pub fn add_header<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, value: V) {
        match HeaderName::from_str(key.as_ref()) {
            Ok(name) => match HeaderValue::from_str(value.as_ref()) {
                Ok(value) => {
                    self.headers.insert(name, value);
                }
                Err(e) => debug!(error = %e, "Invalid header value; skipping"),
            },
            Err(e) => debug!(error = %e, "Invalid header name; skipping"),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, request: PageRequest) -> Result<PageResponse, TransportError> {
        let url_str = request.url.to_string();
        let mut builder = self
            .client
            .get(request.url)
            .headers(self.headers.clone())
            .timeout(self.timeout);
        if let Some(referer) = request.referer.as_deref()
            && let Ok(value) = HeaderValue::from_str(referer)
        {
            builder = builder.header(reqwest::header::REFERER, value);
        }
        if let Some(origin) = request.origin.as_deref()
            && let Ok(value) = HeaderValue::from_str(origin)
        {
            builder = builder.header(reqwest::header::ORIGIN, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, &url_str))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url_str,
            });
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(e, &url_str))?;
        trace!(url = %final_url, bytes = body.len(), "fetched page");
        Ok(PageResponse {
            url: final_url,
            body,
        })
    }
}
