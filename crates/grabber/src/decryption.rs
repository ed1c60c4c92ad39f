// Key acquisition and AES-128 segment decryption.

use std::sync::Arc;
use std::time::Duration;

use aes::Aes128;
use async_trait::async_trait;
use bytes::Bytes;
use cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use moka::future::Cache;
use playlist::{EncryptionKey, KeyId, KeyMethod, KeySource, Segment};
use reqwest::header::HeaderMap;
use tracing::debug;

use crate::error::FetchError;
use crate::transport::{Transport, TransportRequest};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const KEY_LEN: usize = 16;

/// Acquires key material the transport cannot fetch by itself, such as keys
/// of an external key system.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn acquire(&self, key: &EncryptionKey) -> Result<Vec<u8>, FetchError>;
}

/// Offloads CPU-bound decryption to the blocking thread pool.
pub struct DecryptionOffloader {
    enabled: bool,
}

impl DecryptionOffloader {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub async fn decrypt(
        &self,
        data: Bytes,
        key: &[u8; KEY_LEN],
        iv: &[u8; KEY_LEN],
    ) -> Result<Bytes, FetchError> {
        if self.enabled {
            let key = *key;
            let iv = *iv;
            tokio::task::spawn_blocking(move || Self::decrypt_sync(data, &key, &iv))
                .await
                .map_err(|e| FetchError::decryption(format!("decryption task failed: {e}")))?
        } else {
            Self::decrypt_sync(data, key, iv)
        }
    }

    /// AES-128-CBC with PKCS#7 padding.
    pub fn decrypt_sync(
        data: Bytes,
        key: &[u8; KEY_LEN],
        iv: &[u8; KEY_LEN],
    ) -> Result<Bytes, FetchError> {
        let mut buffer = data.to_vec();
        let cipher = Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|e| FetchError::decryption(format!("failed to initialize AES decryptor: {e}")))?;
        let decrypted_len = cipher
            .decrypt_padded_mut::<Pkcs7>(&mut buffer)
            .map_err(|e| FetchError::decryption(format!("decryption failed: {e}")))?
            .len();
        buffer.truncate(decrypted_len);
        Ok(Bytes::from(buffer))
    }
}

/// IV of a segment: the explicit one, else the media sequence number as a
/// big-endian 128-bit integer.
pub fn iv_for(key: &EncryptionKey, segment: &Segment) -> [u8; KEY_LEN] {
    key.iv
        .unwrap_or_else(|| u128::from(segment.sequence.unwrap_or(0)).to_be_bytes())
}

/// Key material per key id, loaded at most once even under concurrent demand.
pub struct KeyStore {
    cache: Cache<KeyId, [u8; KEY_LEN]>,
    transport: Arc<dyn Transport>,
    headers: HeaderMap,
    provider: Option<Arc<dyn KeyProvider>>,
    timeout: Duration,
}

impl KeyStore {
    pub fn new(
        transport: Arc<dyn Transport>,
        headers: HeaderMap,
        provider: Option<Arc<dyn KeyProvider>>,
        timeout: Duration,
    ) -> Self {
        Self {
            cache: Cache::builder().max_capacity(256).build(),
            transport,
            headers,
            provider,
            timeout,
        }
    }

    /// Failed loads are not cached, so the next attempt tries again.
    pub async fn key(&self, key: &EncryptionKey) -> Result<[u8; KEY_LEN], FetchError> {
        if key.method != KeyMethod::Aes128 {
            return Err(FetchError::UnsupportedKeyMethod {
                method: key.method.to_string(),
            });
        }
        self.cache
            .try_get_with(key.id, self.load(key))
            .await
            .map_err(|e: Arc<FetchError>| e.as_ref().clone())
    }

    async fn load(&self, key: &EncryptionKey) -> Result<[u8; KEY_LEN], FetchError> {
        let material = match &key.source {
            KeySource::Inline(bytes) => bytes.clone(),
            KeySource::Uri(url) => {
                debug!(key = key.id.0, url = %url, "fetching key");
                let request = TransportRequest::get(url.clone()).with_headers(self.headers.clone());
                match tokio::time::timeout(self.timeout, self.transport.get(&request)).await {
                    Ok(result) => result?.to_vec(),
                    Err(_) => return Err(FetchError::Timeout(self.timeout)),
                }
            }
            KeySource::External { keyformat, uri } => {
                let Some(provider) = &self.provider else {
                    return Err(FetchError::missing_key(format!(
                        "key {} ({keyformat}{}) needs a key provider",
                        key.id.0,
                        uri.as_deref().map(|u| format!(", {u}")).unwrap_or_default()
                    )));
                };
                provider.acquire(key).await?
            }
        };
        to_key(&material)
    }
}

fn to_key(material: &[u8]) -> Result<[u8; KEY_LEN], FetchError> {
    material.try_into().map_err(|_| {
        FetchError::invalid_key(format!(
            "expected {KEY_LEN} bytes of key material, got {}",
            material.len()
        ))
    })
}
