// Segment Fetcher: one attempt at downloading (and decrypting) one segment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use playlist::{Manifest, Segment};
use reqwest::header::HeaderMap;
use tracing::{instrument, trace};

use crate::decryption::{DecryptionOffloader, KeyStore, iv_for};
use crate::error::FetchError;
use crate::transport::{Transport, TransportRequest};

/// A segment scheduled for download, with its position in the manifest.
#[derive(Debug, Clone)]
pub struct SegmentJob {
    pub index: usize,
    pub segment: Segment,
}

#[async_trait]
pub trait SegmentDownloader: Send + Sync {
    /// A single attempt; retries belong to the caller.
    async fn download(&self, job: &SegmentJob) -> Result<Bytes, FetchError>;
}

pub struct SegmentFetcher {
    transport: Arc<dyn Transport>,
    manifest: Arc<Manifest>,
    keys: Arc<KeyStore>,
    offloader: DecryptionOffloader,
    headers: HeaderMap,
    timeout: Duration,
}

impl SegmentFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        manifest: Arc<Manifest>,
        keys: Arc<KeyStore>,
        offloader: DecryptionOffloader,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            manifest,
            keys,
            offloader,
            headers,
            timeout,
        }
    }

    async fn fetch_raw(&self, segment: &Segment) -> Result<Bytes, FetchError> {
        let request = TransportRequest::get(segment.url.clone())
            .with_range(segment.byte_range)
            .with_headers(self.headers.clone());
        let body = match tokio::time::timeout(self.timeout, self.transport.get(&request)).await {
            Ok(result) => result?,
            Err(_) => return Err(FetchError::Timeout(self.timeout)),
        };

        if let Some(range) = segment.byte_range
            && body.len() as u64 != range.length
        {
            return Err(FetchError::TruncatedRange {
                expected: range.length,
                received: body.len() as u64,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl SegmentDownloader for SegmentFetcher {
    #[instrument(skip(self, job), fields(index = job.index, url = %job.segment.url))]
    async fn download(&self, job: &SegmentJob) -> Result<Bytes, FetchError> {
        // Resolve the key before spending bandwidth on the body.
        let key = match job.segment.key {
            Some(id) => {
                let key = self
                    .manifest
                    .key(id)
                    .ok_or_else(|| FetchError::missing_key(format!("key {}", id.0)))?;
                Some((self.keys.key(key).await?, iv_for(key, &job.segment)))
            }
            None => None,
        };

        let body = self.fetch_raw(&job.segment).await?;
        trace!(bytes = body.len(), "segment body received");

        match key {
            Some((material, iv)) => self.offloader.decrypt(body, &material, &iv).await,
            None => Ok(body),
        }
    }
}
