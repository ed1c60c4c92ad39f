use std::collections::BTreeMap;
use std::time::Duration;

use playlist::VariantSelection;
use serde::{Deserialize, Serialize};

use crate::error::DownloadError;
use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Settings for the HTTP client used by the default transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub user_agent: String,
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    pub follow_redirects: bool,
    #[serde(with = "duration_ms")]
    pub pool_idle_timeout: Duration,
    /// Proxy URL applied to every scheme.
    pub proxy: Option<String>,
    pub accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            pool_idle_timeout: Duration::from_secs(90),
            proxy: None,
            accept_invalid_certs: false,
        }
    }
}

impl ClientConfig {
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Options of one download session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    /// Maximum number of segment fetches in flight.
    pub concurrency: usize,
    /// Total attempts allowed per segment, the first one included.
    pub retries_per_segment: u32,
    #[serde(with = "duration_ms")]
    pub timeout_per_segment: Duration,
    /// Extra request headers sent with manifest, key and segment requests.
    pub headers: BTreeMap<String, String>,
    /// Keep partial output and a resume record so a later session can continue.
    pub resumable: bool,
    #[serde(with = "duration_ms")]
    pub retry_base_delay: Duration,
    #[serde(with = "duration_ms")]
    pub retry_max_delay: Duration,
    pub retry_jitter: bool,
    /// How far dispatch may run ahead of the next segment to write.
    /// `0` means `concurrency * 4`.
    pub reorder_window: usize,
    pub variant_selection: VariantSelection,
    /// Run AES decryption on the blocking pool.
    pub offload_decryption: bool,
    pub client: ClientConfig,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retries_per_segment: 3,
            timeout_per_segment: Duration::from_secs(30),
            headers: BTreeMap::new(),
            resumable: false,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(10),
            retry_jitter: true,
            reorder_window: 0,
            variant_selection: VariantSelection::default(),
            offload_decryption: false,
            client: ClientConfig::default(),
        }
    }
}

impl DownloadOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_retries_per_segment(mut self, attempts: u32) -> Self {
        self.retries_per_segment = attempts;
        self
    }

    pub fn with_timeout_per_segment(mut self, timeout: Duration) -> Self {
        self.timeout_per_segment = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_resumable(mut self, resumable: bool) -> Self {
        self.resumable = resumable;
        self
    }

    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    pub fn with_retry_jitter(mut self, jitter: bool) -> Self {
        self.retry_jitter = jitter;
        self
    }

    pub fn with_reorder_window(mut self, window: usize) -> Self {
        self.reorder_window = window;
        self
    }

    pub fn with_variant_selection(mut self, selection: VariantSelection) -> Self {
        self.variant_selection = selection;
        self
    }

    pub fn with_offload_decryption(mut self, enabled: bool) -> Self {
        self.offload_decryption = enabled;
        self
    }

    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.concurrency == 0 {
            return Err(DownloadError::invalid_options("concurrency must be at least 1"));
        }
        if self.retries_per_segment == 0 {
            return Err(DownloadError::invalid_options(
                "retries_per_segment must be at least 1",
            ));
        }
        if self.timeout_per_segment.is_zero() {
            return Err(DownloadError::invalid_options(
                "timeout_per_segment must be positive",
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retries_per_segment,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay.max(self.retry_base_delay),
            jitter: self.retry_jitter,
        }
    }

    /// Dispatch window in segments; never smaller than the concurrency.
    pub fn effective_reorder_window(&self) -> usize {
        let window = if self.reorder_window == 0 {
            self.concurrency.saturating_mul(4)
        } else {
            self.reorder_window
        };
        window.max(self.concurrency).max(1)
    }

    /// Whether the caller already set `name` (case-insensitive).
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}

/// Serde helper storing a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
