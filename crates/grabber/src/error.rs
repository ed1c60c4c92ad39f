use std::time::Duration;

use playlist::ParseError;
use serde::Serialize;
use stream_resolver::ResolutionError;
use thiserror::Error;

/// Failure of a single fetch (segment, key or manifest).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status} for {url}")]
    BadStatus { status: u16, url: String },

    #[error("byte range truncated: expected {expected} bytes, received {received}")]
    TruncatedRange { expected: u64, received: u64 },

    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    #[error("transport error: {reason}")]
    Transport { reason: String, retryable: bool },

    #[error("no key material for {key}")]
    MissingKey { key: String },

    #[error("invalid key material: {reason}")]
    InvalidKey { reason: String },

    #[error("unsupported key method {method}")]
    UnsupportedKeyMethod { method: String },

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn bad_status(status: u16, url: impl Into<String>) -> Self {
        Self::BadStatus {
            status,
            url: url.into(),
        }
    }

    pub fn decryption(reason: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            reason: reason.into(),
            retryable,
        }
    }

    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }

    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    /// Classifies a `reqwest` failure.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Self::Timeout(timeout);
        }
        if let Some(status) = err.status() {
            let url = err.url().map(|u| u.to_string()).unwrap_or_default();
            return Self::bad_status(status.as_u16(), url);
        }
        let retryable = crate::retry::is_retryable_reqwest_error(&err);
        Self::transport(err.to_string(), retryable)
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_)
            | Self::TruncatedRange { .. }
            | Self::DecryptionFailed { .. } => true,
            Self::BadStatus { status, .. } => {
                (500..600).contains(status) || *status == 408 || *status == 429
            }
            Self::Transport { retryable, .. } => *retryable,
            Self::MissingKey { .. }
            | Self::InvalidKey { .. }
            | Self::UnsupportedKeyMethod { .. }
            | Self::Cancelled => false,
        }
    }
}

/// Coarse classification of a [`DownloadError`] for hosts and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Cancelled,
    Configuration,
    Parse,
    Resolution,
    Network,
    Segment,
    Io,
    Internal,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    #[error("invalid options: {reason}")]
    InvalidOptions { reason: String },

    #[error("manifest error: {0}")]
    Parse(#[from] ParseError),

    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("page sources need a resolver")]
    ResolverMissing,

    #[error("failed to fetch manifest {url}: {source}")]
    ManifestFetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("segment {index} failed: {source}")]
    Segment {
        index: usize,
        #[source]
        source: FetchError,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("HTTP client error: {reason}")]
    Client { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl DownloadError {
    pub fn invalid_options(reason: impl Into<String>) -> Self {
        Self::InvalidOptions {
            reason: reason.into(),
        }
    }

    pub fn manifest_fetch(url: impl Into<String>, source: FetchError) -> Self {
        Self::ManifestFetch {
            url: url.into(),
            source,
        }
    }

    pub fn segment(index: usize, source: FetchError) -> Self {
        Self::Segment { index, source }
    }

    pub fn client(reason: impl Into<String>) -> Self {
        Self::Client {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidOptions { .. } | Self::ResolverMissing | Self::Client { .. } => {
                ErrorKind::Configuration
            }
            Self::Parse(_) => ErrorKind::Parse,
            Self::Resolution(_) => ErrorKind::Resolution,
            Self::ManifestFetch { .. } => ErrorKind::Network,
            Self::Segment { .. } => ErrorKind::Segment,
            Self::Io { .. } => ErrorKind::Io,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
