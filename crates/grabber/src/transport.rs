use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use playlist::{ByteRange, SourceError, VariantSource};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::error::FetchError;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};

/// A single GET issued by the engine.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: Url,
    pub range: Option<ByteRange>,
    pub headers: HeaderMap,
}

impl TransportRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            range: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_range(mut self, range: Option<ByteRange>) -> Self {
        self.range = range;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Network capability of a download session.
///
/// Implementations return the full body of a 2xx answer and report other
/// statuses as [`FetchError::BadStatus`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &TransportRequest) -> Result<Bytes, FetchError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &TransportRequest) -> Result<Bytes, FetchError> {
        let mut builder = self
            .client
            .get(request.url.clone())
            .headers(request.headers.clone())
            .timeout(self.request_timeout);
        if let Some(range) = &request.range {
            builder = builder.header(reqwest::header::RANGE, range.header_value());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.request_timeout))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::bad_status(status.as_u16(), request.url.as_str()));
        }
        trace!(url = %request.url, version = ?response.version(), "response headers received");

        response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.request_timeout))
    }
}

/// Converts caller-supplied headers, skipping entries that are not valid HTTP.
pub fn build_header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        match HeaderName::from_str(key) {
            Ok(name) => match HeaderValue::from_str(value) {
                Ok(value) => {
                    map.insert(name, value);
                }
                Err(e) => debug!(header = %key, error = %e, "Invalid header value; skipping"),
            },
            Err(e) => debug!(header = %key, error = %e, "Invalid header name; skipping"),
        }
    }
    map
}

/// Fetches one resource with the per-request timeout and the retry policy applied.
pub async fn fetch_with_retry(
    transport: &dyn Transport,
    request: &TransportRequest,
    policy: &RetryPolicy,
    token: &CancellationToken,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    retry_with_backoff(policy, token, |attempt| async move {
        trace!(url = %request.url, attempt, "fetching");
        let result = match tokio::time::timeout(timeout, transport.get(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };
        RetryAction::from_result(result)
    })
    .await
}

/// Playlist text through the session transport, for nested variant playlists.
pub struct TransportVariantSource {
    transport: Arc<dyn Transport>,
    headers: HeaderMap,
    policy: RetryPolicy,
    token: CancellationToken,
    timeout: Duration,
}

impl TransportVariantSource {
    pub fn new(
        transport: Arc<dyn Transport>,
        headers: HeaderMap,
        policy: RetryPolicy,
        token: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            headers,
            policy,
            token,
            timeout,
        }
    }

    pub async fn fetch_text(&self, url: &Url) -> Result<String, FetchError> {
        let request = TransportRequest::get(url.clone()).with_headers(self.headers.clone());
        let body = fetch_with_retry(
            self.transport.as_ref(),
            &request,
            &self.policy,
            &self.token,
            self.timeout,
        )
        .await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl VariantSource for TransportVariantSource {
    async fn fetch_playlist(&self, url: &Url) -> Result<String, SourceError> {
        self.fetch_text(url).await.map_err(|e| match e {
            FetchError::BadStatus { status, .. } => SourceError::Status { status },
            FetchError::Cancelled => SourceError::Cancelled,
            other => SourceError::transport(other.to_string()),
        })
    }
}
